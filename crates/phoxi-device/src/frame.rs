use crate::{DeviceError, FrameId, Resolution, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use time::OffsetDateTime;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<[f32; 3]>,
}

impl PointCloud {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Per-pixel intensity texture, row-major.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Texture {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One capture result as returned by the device.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub id: FrameId,
    pub resolution: Resolution,
    pub point_cloud: Option<PointCloud>,
    pub texture: Option<Texture>,
    pub ts: Option<OffsetDateTime>,
}

impl Frame {
    /// True when the frame carries neither points nor texture.
    pub fn is_empty(&self) -> bool {
        !self.has_point_cloud() && !self.has_texture()
    }

    pub fn has_point_cloud(&self) -> bool {
        self.point_cloud.as_ref().is_some_and(|pc| !pc.is_empty())
    }

    pub fn has_texture(&self) -> bool {
        self.texture.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Write the point cloud as PLY. Texture intensities are attached per vertex when
    /// `textured` is set and the texture matches the cloud size.
    pub fn save_as_ply(&self, path: &Path, textured: bool, binary: bool) -> Result<()> {
        let cloud = match &self.point_cloud {
            Some(pc) if !pc.is_empty() => pc,
            _ => return Err(DeviceError::Unsupported("frame has no point cloud")),
        };
        let intensity = match (&self.texture, textured) {
            (Some(tex), true) if tex.data.len() == cloud.points.len() => Some(&tex.data),
            _ => None,
        };

        let file = File::create(path).map_err(|e| DeviceError::Io(e.to_string()))?;
        let mut out = BufWriter::new(file);
        write_ply(&mut out, &cloud.points, intensity.map(|v| v.as_slice()), binary)
            .map_err(|e| DeviceError::Io(e.to_string()))?;
        out.flush().map_err(|e| DeviceError::Io(e.to_string()))
    }
}

fn write_ply<W: Write>(
    out: &mut W,
    points: &[[f32; 3]],
    intensity: Option<&[f32]>,
    binary: bool,
) -> std::io::Result<()> {
    let format = if binary {
        "binary_little_endian"
    } else {
        "ascii"
    };
    write!(
        out,
        "ply\nformat {format} 1.0\ncomment generated by phoxi-device\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\n",
        points.len()
    )?;
    if intensity.is_some() {
        out.write_all(b"property float intensity\n")?;
    }
    out.write_all(b"end_header\n")?;

    for (i, p) in points.iter().enumerate() {
        let value = intensity.and_then(|v| v.get(i)).copied();
        if binary {
            for c in p {
                out.write_all(&c.to_le_bytes())?;
            }
            if let Some(v) = value {
                out.write_all(&v.to_le_bytes())?;
            }
        } else {
            match value {
                Some(v) => writeln!(out, "{} {} {} {}", p[0], p[1], p[2], v)?,
                None => writeln!(out, "{} {} {}", p[0], p[1], p[2])?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(points: Vec<[f32; 3]>, texture: Option<Vec<f32>>) -> Frame {
        Frame {
            id: FrameId::from_raw(3).unwrap(),
            resolution: Resolution::new(2, 1),
            point_cloud: Some(PointCloud { points }),
            texture: texture.map(|data| Texture {
                width: 2,
                height: 1,
                data,
            }),
            ts: None,
        }
    }

    #[test]
    fn empty_cloud_without_texture_is_empty_frame() {
        let f = frame_with(vec![], None);
        assert!(f.is_empty());
        assert!(!f.has_point_cloud());
    }

    #[test]
    fn texture_alone_keeps_frame_non_empty() {
        let f = frame_with(vec![], Some(vec![0.5, 0.25]));
        assert!(!f.is_empty());
        assert!(!f.has_point_cloud());
    }

    #[test]
    fn ascii_ply_lists_vertices_with_intensity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.ply");
        let f = frame_with(vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], Some(vec![0.5, 1.0]));
        f.save_as_ply(&path, true, false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert!(text.contains("element vertex 2\n"));
        assert!(text.contains("property float intensity\n"));
        assert!(text.ends_with("1 2 3 0.5\n4 5 6 1\n"));
    }

    #[test]
    fn binary_ply_body_is_packed_floats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.ply");
        let f = frame_with(vec![[1.0, 2.0, 3.0]], None);
        f.save_as_ply(&path, true, true).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let header_end = b"end_header\n";
        let pos = bytes
            .windows(header_end.len())
            .position(|w| w == header_end)
            .unwrap();
        assert_eq!(bytes.len() - (pos + header_end.len()), 3 * 4);
    }

    #[test]
    fn ply_save_into_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("cloud.ply");
        let f = frame_with(vec![[0.0, 0.0, 1.0]], None);
        assert!(matches!(
            f.save_as_ply(&path, true, true),
            Err(DeviceError::Io(_))
        ));
    }
}
