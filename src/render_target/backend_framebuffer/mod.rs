mod fbset;
mod mapping;

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

pub use fbset::{Channel, FbInfo, RgbaLayout};
use mapping::MappedRegion;
use tracing::{debug, info};

use super::{RenderTarget, check_frame_len};
use crate::{
    error::{Error, Result},
    graphics::GraphicsContext,
};

pub struct FramebufferTarget {
    path: PathBuf,
    info: FbInfo,
    context: GraphicsContext,
    map: MappedRegion,
    // Keeps the descriptor open for as long as the mapping lives.
    _file: File,
}

impl FramebufferTarget {
    /// Queries `fbset` for the device geometry, then maps the device.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::DeviceNotFound {
                path: path.to_path_buf(),
            });
        }
        let info = FbInfo::query(path)?;
        Self::open_with_info(path, info)
    }

    /// Maps `path` using already known geometry.
    pub fn open_with_info(path: impl AsRef<Path>, info: FbInfo) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let context = info.graphics_context()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::from_open(&path, e))?;
        let map = MappedRegion::map(&file, info.mapping_len())?;

        info!(
            path = %path.display(),
            width = context.width,
            height = context.height,
            format = %context.pixel_format,
            stride = info.stride(),
            "mapped framebuffer"
        );
        Ok(Self {
            path,
            info,
            context,
            map,
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &FbInfo {
        &self.info
    }
}

impl RenderTarget for FramebufferTarget {
    fn graphics_context(&self) -> GraphicsContext {
        self.context
    }

    fn swap_buffer(&mut self, buffer: &[u8]) -> Result<()> {
        check_frame_len(&self.context, buffer)?;

        let row_len = self.context.width as usize * self.context.bytes_per_pixel();
        let stride = self.info.stride();
        let dst = self.map.as_mut_slice();

        if stride == row_len {
            dst[..buffer.len()].copy_from_slice(buffer);
        } else {
            for (row, src) in buffer.chunks_exact(row_len).enumerate() {
                let start = row * stride;
                dst[start..start + row_len].copy_from_slice(src);
            }
        }
        Ok(())
    }
}

impl Drop for FramebufferTarget {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), len = self.map.len(), "unmapping framebuffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::PixelFormat;

    fn fake_device(info: &FbInfo) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(info.mapping_len() as u64).unwrap();
        file
    }

    fn info(width: i32, height: i32, virtual_width: i32, virtual_height: i32) -> FbInfo {
        FbInfo::parse(&format!(
            "geometry {width} {height} {virtual_width} {virtual_height} 16\nrgba 5/11,6/5,5/0,0/0\n"
        ))
        .unwrap()
    }

    #[test]
    fn missing_device() {
        assert!(matches!(
            FramebufferTarget::open("/nonexistent/fb9"),
            Err(Error::DeviceNotFound { .. })
        ));
    }

    #[test]
    fn rejects_wrong_frame_size() {
        let info = info(4, 2, 4, 2);
        let device = fake_device(&info);
        let mut target = FramebufferTarget::open_with_info(device.path(), info).unwrap();
        assert_eq!(target.graphics_context().pixel_format, PixelFormat::Rgb565);

        let err = target.swap_buffer(&[0; 15]).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferSizeMismatch {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn copies_rows_at_virtual_stride() {
        // 2x2 visible inside a 3x4 virtual area.
        let info = info(2, 2, 3, 4);
        let device = fake_device(&info);
        let mut target = FramebufferTarget::open_with_info(device.path(), info).unwrap();

        target.swap_buffer(&[1, 1, 2, 2, 3, 3, 4, 4]).unwrap();
        drop(target);

        let bytes = std::fs::read(device.path()).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..6], &[1, 1, 2, 2, 0, 0]);
        assert_eq!(&bytes[6..12], &[3, 3, 4, 4, 0, 0]);
        assert!(bytes[12..].iter().all(|&b| b == 0));
    }
}
