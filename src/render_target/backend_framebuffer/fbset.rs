use std::{path::Path, process::Command};

use tracing::debug;

use crate::{
    error::{Error, Result},
    graphics::{GraphicsContext, PixelFormat},
};

/// Bit length and offset of one color channel inside a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Channel {
    pub length: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RgbaLayout {
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
    pub alpha: Channel,
}

/// Display geometry as reported by `fbset`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FbInfo {
    pub mode: Option<String>,
    pub width: i32,
    pub height: i32,
    pub virtual_width: i32,
    pub virtual_height: i32,
    pub depth: u32,
    pub timings: [u32; 7],
    pub rgba: Option<RgbaLayout>,
}

impl FbInfo {
    /// Runs `fbset -fb <device>` and parses its output.
    pub fn query(device: &Path) -> Result<Self> {
        let output = Command::new("fbset")
            .arg("-fb")
            .arg(device)
            .output()
            .map_err(|e| Error::DeviceQueryFailed(format!("could not run fbset: {e}")))?;
        if !output.status.success() {
            return Err(Error::DeviceQueryFailed(format!(
                "fbset exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let info = Self::parse(&String::from_utf8_lossy(&output.stdout))?;
        debug!(device = %device.display(), ?info, "queried framebuffer");
        Ok(info)
    }

    /// Parses the `mode ... endmode` block. `geometry` is required, the
    /// other lines are optional.
    pub fn parse(text: &str) -> Result<Self> {
        let mut info = FbInfo::default();
        let mut has_geometry = false;

        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("mode") => {
                    let rest = line.trim_start().trim_start_matches("mode").trim();
                    info.mode = Some(rest.trim_matches('"').to_owned());
                }
                Some("geometry") => {
                    let values = parse_numbers::<i64>(tokens, 5, "geometry")?;
                    info.width = to_i32(values[0])?;
                    info.height = to_i32(values[1])?;
                    info.virtual_width = to_i32(values[2])?;
                    info.virtual_height = to_i32(values[3])?;
                    info.depth = u32::try_from(values[4])
                        .map_err(|_| Error::DeviceQueryFailed("negative depth".into()))?;
                    has_geometry = true;
                }
                Some("timings") => {
                    let values = parse_numbers::<u32>(tokens, 7, "timings")?;
                    info.timings.copy_from_slice(&values);
                }
                Some("rgba") => {
                    let rest: String = tokens.collect();
                    info.rgba = Some(parse_rgba(&rest)?);
                }
                _ => {}
            }
        }

        if !has_geometry {
            return Err(Error::DeviceQueryFailed(
                "fbset output has no geometry line".into(),
            ));
        }
        Ok(info)
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.depth as usize / 8
    }

    /// Bytes between the starts of two rows in the mapping.
    pub fn stride(&self) -> usize {
        self.virtual_width.max(self.width).max(0) as usize * self.bytes_per_pixel()
    }

    /// Size of the whole virtual framebuffer.
    pub fn mapping_len(&self) -> usize {
        self.stride() * self.virtual_height.max(self.height).max(0) as usize
    }

    /// Matches the reported depth and channel offsets against the formats the
    /// draw buffer can encode.
    pub fn pixel_format(&self) -> Result<PixelFormat> {
        let Some(rgba) = self.rgba else {
            return Err(Error::UnsupportedPixelFormat(
                "fbset reported no channel layout".into(),
            ));
        };
        let offsets = (rgba.red.offset, rgba.green.offset, rgba.blue.offset);
        let alpha_ok = rgba.alpha.length == 0 || rgba.alpha.offset == 24;

        match (self.depth, offsets) {
            (32, (0, 8, 16)) if alpha_ok => Ok(PixelFormat::Rgba8888),
            (32, (16, 8, 0)) if alpha_ok => Ok(PixelFormat::Bgra8888),
            // Some drivers report 565 with the channels in reverse order.
            (16, (11, 5, 0)) | (16, (0, 5, 10)) => Ok(PixelFormat::Rgb565),
            (depth, (r, g, b)) => Err(Error::UnsupportedPixelFormat(format!(
                "depth {depth} with red@{r} green@{g} blue@{b} alpha@{}/{}",
                rgba.alpha.offset, rgba.alpha.length
            ))),
        }
    }

    pub fn graphics_context(&self) -> Result<GraphicsContext> {
        Ok(GraphicsContext::new(
            self.width,
            self.height,
            self.pixel_format()?,
        ))
    }
}

fn parse_numbers<'a, T: std::str::FromStr>(
    tokens: impl Iterator<Item = &'a str>,
    count: usize,
    what: &str,
) -> Result<Vec<T>> {
    let values = tokens
        .take(count)
        .map(|t| t.parse::<T>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| Error::DeviceQueryFailed(format!("malformed {what} line")))?;
    if values.len() != count {
        return Err(Error::DeviceQueryFailed(format!(
            "{what} line needs {count} values, got {}",
            values.len()
        )));
    }
    Ok(values)
}

fn to_i32(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::DeviceQueryFailed(format!("{value} out of range")))
}

/// `8/16,8/8,8/0,0/0` in red, green, blue, alpha order.
fn parse_rgba(text: &str) -> Result<RgbaLayout> {
    let malformed = || Error::DeviceQueryFailed(format!("malformed rgba line '{text}'"));
    let channels = text
        .split(',')
        .map(|pair| {
            let (length, offset) = pair.split_once('/').ok_or_else(malformed)?;
            Ok(Channel {
                length: length.trim().parse().map_err(|_| malformed())?,
                offset: offset.trim().parse().map_err(|_| malformed())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let [red, green, blue, alpha] = channels.as_slice() else {
        return Err(malformed());
    };
    Ok(RgbaLayout {
        red: *red,
        green: *green,
        blue: *blue,
        alpha: *alpha,
    })
}
