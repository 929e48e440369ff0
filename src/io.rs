//! Export of partitioned forests.
use std::path::Path;

use itertools::Itertools;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataSet, UnstructuredGridPiece, Version,
    VertexNumbers, Vtk,
};

use crate::{
    comm::ProcessGroup,
    error::{Error, Result},
    forest::Forest,
    mesh::DistributedMesh,
};

/// Corners of the unit cell in the vertex order of the VTK cell types.
fn corner_order(dim: usize) -> Vec<usize> {
    match dim {
        1 => vec![0, 1],
        2 => vec![0, 1, 3, 2],
        _ => vec![0, 1, 3, 2, 4, 5, 7, 6],
    }
}

fn cell_type(dim: usize) -> CellType {
    match dim {
        1 => CellType::Line,
        2 => CellType::Quad,
        _ => CellType::Hexahedron,
    }
}

/// Export the active cells of a forest to a legacy VTK file.
///
/// `owner` gives the rank owning each active cell. It is written as cell data
/// together with the level and the tree of every cell.
pub fn export_forest_to_vtk<const DIM: usize, P: AsRef<Path>>(
    forest: &Forest<DIM>,
    owner: impl Fn(usize) -> Option<usize>,
    path: P,
) -> Result<()> {
    let active = forest.active_cells().collect_vec();
    let corners = corner_order(DIM);

    let mut points = Vec::<f64>::with_capacity(3 * corners.len() * active.len());
    for &id in &active {
        let bounds = forest.bounding_box(id);
        let (lower, upper) = (bounds.lower(), bounds.upper());
        for &corner in &corners {
            for d in 0..3 {
                if d >= DIM {
                    points.push(0.0);
                } else if (corner >> d) & 1 == 1 {
                    points.push(upper[d]);
                } else {
                    points.push(lower[d]);
                }
            }
        }
    }

    let vertices = (0..(active.len() * corners.len()) as u32)
        .chunks(corners.len())
        .into_iter()
        .flat_map(|cell| std::iter::once(corners.len() as u32).chain(cell))
        .collect_vec();

    let owners = active
        .iter()
        .map(|&id| owner(id).map_or(-1, |rank| rank as i64))
        .collect_vec();
    let levels = active
        .iter()
        .map(|&id| forest.cell(id).level() as u64)
        .collect_vec();
    let trees = active
        .iter()
        .map(|&id| forest.cell(id).tree() as u64)
        .collect_vec();

    let vtk = Vtk {
        version: Version { major: 4, minor: 1 },
        title: String::from("Partitioned forest"),
        byte_order: ByteOrder::BigEndian,
        file_path: None,
        data: DataSet::inline(UnstructuredGridPiece {
            points: points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::Legacy {
                    num_cells: active.len() as u32,
                    vertices,
                },
                types: vec![cell_type(DIM); active.len()],
            },
            data: Attributes {
                point: vec![],
                cell: vec![
                    Attribute::scalars("owner", 1).with_data(owners),
                    Attribute::scalars("level", 1).with_data(levels),
                    Attribute::scalars("tree", 1).with_data(trees),
                ],
            },
        }),
    };

    vtk.export_ascii(path.as_ref())
        .map_err(|err| Error::Export(format!("{}: {:?}", path.as_ref().display(), err)))
}

/// Export the partition of a distributed mesh to a legacy VTK file.
///
/// Every rank knows the owner of every active cell, so it suffices to call this on one rank.
pub fn export_partition_to_vtk<G: ProcessGroup, const DIM: usize, P: AsRef<Path>>(
    mesh: &DistributedMesh<'_, G, DIM>,
    path: P,
) -> Result<()> {
    export_forest_to_vtk(mesh.forest(), |id| mesh.owner(id), path)
}

#[cfg(test)]
mod test {
    use super::{export_forest_to_vtk, export_partition_to_vtk};
    use crate::{
        comm::SerialGroup,
        forest::Forest,
        mesh::{DistributedMesh, Settings},
    };

    #[test]
    fn test_export_partition() {
        let comm = SerialGroup;
        let mut forest = Forest::<2>::subdivided_hyper_cube(2, 0.0, 1.0).unwrap();
        forest.refine(0).unwrap();
        let mesh = DistributedMesh::new(forest, Settings::default(), &comm).unwrap();

        let path = std::env::temp_dir().join("bempp_forest_partition.vtk");
        export_partition_to_vtk(&mesh, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("CELLS 7 35"));
        assert!(contents.contains("owner"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_export_to_missing_directory() {
        let forest = Forest::<3>::subdivided_hyper_cube(1, 0.0, 1.0).unwrap();
        let path = std::env::temp_dir()
            .join("bempp_forest_missing")
            .join("forest.vtk");

        assert!(export_forest_to_vtk(&forest, |_| Some(0), path).is_err());
    }
}
