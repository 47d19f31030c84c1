//! Minimal Wavefront OBJ reader and writer.
//!
//! Only `v` and `f` records are interpreted; normals, texture coordinates
//! and grouping directives are skipped. Faces keep their vertex loops, so
//! polygonal input round-trips unchanged.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use glam::DVec3;
use nom::{
    character::complete::{char, i64 as nom_i64, space1},
    combinator::opt,
    multi::many1,
    number::complete::double,
    sequence::preceded,
    IResult,
};
use thiserror::Error;

use crate::mesh::IndexedMesh;

#[derive(Error, Debug)]
pub enum ObjError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid vertex index {index} at line {line}")]
    InvalidIndex { line: usize, index: i64 },
}

type Result<T> = std::result::Result<T, ObjError>;

// `x y z [w]`; the optional weight is ignored
fn vertex_line(input: &str) -> IResult<&str, DVec3> {
    let (input, x) = preceded(space1, double)(input)?;
    let (input, y) = preceded(space1, double)(input)?;
    let (input, z) = preceded(space1, double)(input)?;
    let (input, _) = opt(preceded(space1, double))(input)?;
    Ok((input, DVec3::new(x, y, z)))
}

// One face corner: `v`, `v/vt`, `v//vn` or `v/vt/vn`; only `v` is kept
fn face_corner(input: &str) -> IResult<&str, i64> {
    let (input, v) = nom_i64(input)?;
    let (input, _) = opt(preceded(char('/'), opt(nom_i64)))(input)?;
    let (input, _) = opt(preceded(char('/'), nom_i64))(input)?;
    Ok((input, v))
}

fn face_line(input: &str) -> IResult<&str, Vec<i64>> {
    many1(preceded(space1, face_corner))(input)
}

fn resolve_index(raw: i64, vertex_count: usize, line: usize) -> Result<u32> {
    let count = vertex_count as i64;
    let id = if raw > 0 { raw } else { count + raw + 1 };
    if id < 1 || id > count {
        return Err(ObjError::InvalidIndex { line, index: raw });
    }
    Ok(id as u32)
}

/// Parse OBJ text into an [`IndexedMesh`].
pub fn parse_obj(text: &str) -> Result<IndexedMesh> {
    let mut mesh = IndexedMesh::new();
    for (number, raw) in text.lines().enumerate() {
        let line = number + 1;
        let record = raw.trim_end();
        if record.starts_with("v ") || record.starts_with("v\t") {
            let (_, point) = vertex_line(&record[1..]).map_err(|e| ObjError::Parse {
                line,
                message: e.to_string(),
            })?;
            mesh.add_vertex(point);
        } else if record.starts_with("f ") || record.starts_with("f\t") {
            let (_, corners) = face_line(&record[1..]).map_err(|e| ObjError::Parse {
                line,
                message: e.to_string(),
            })?;
            if corners.len() < 3 {
                return Err(ObjError::Parse {
                    line,
                    message: "face needs at least three vertices".into(),
                });
            }
            let mut ids = Vec::with_capacity(corners.len());
            for corner in corners {
                ids.push(resolve_index(corner, mesh.vertex_count(), line)?);
            }
            mesh.add_face(ids);
        }
        // All other records (vn, vt, comments, groups, materials) are skipped
    }
    Ok(mesh)
}

/// Read an OBJ file from disk.
pub fn read_obj(path: impl AsRef<Path>) -> Result<IndexedMesh> {
    let text = fs::read_to_string(path)?;
    parse_obj(&text)
}

/// Write a mesh as OBJ: `v` records in id order, then `f` records.
pub fn write_obj<W: Write>(writer: &mut W, mesh: &IndexedMesh) -> io::Result<()> {
    for v in mesh.vertices() {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for face in mesh.faces() {
        write!(writer, "f")?;
        for id in face {
            write!(writer, " {id}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write a mesh as an OBJ file on disk.
pub fn write_obj_file(path: impl AsRef<Path>, mesh: &IndexedMesh) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    write_obj(&mut writer, mesh)?;
    Ok(())
}
