//! ASCII PLY export.

use crate::cloud::CloudPoint;
use std::io::{self, Write};

/// Write a colored point set as an ASCII PLY document.
///
/// The header declares the vertex count and per-vertex float x/y/z plus
/// uchar red/green/blue properties in conventional RGB order. An empty
/// point set produces a valid zero-vertex file.
pub fn write_ply<W: Write>(writer: &mut W, points: &[CloudPoint]) -> io::Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", points.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "property uchar red")?;
    writeln!(writer, "property uchar green")?;
    writeln!(writer, "property uchar blue")?;
    writeln!(writer, "end_header")?;

    for p in points {
        writeln!(
            writer,
            "{} {} {} {} {} {}",
            p.position[0], p.position[1], p.position[2], p.color[0], p.color[1], p.color[2]
        )?;
    }

    Ok(())
}
