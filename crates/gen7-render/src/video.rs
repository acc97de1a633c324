//! YUV frame descriptors and their per-plane surface layouts.

use serde::{Deserialize, Serialize};

use crate::format::SurfaceFormat;
use crate::kernel::Kernel;
use crate::surface::SurfaceDesc;
use crate::transport::Buffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FourCc {
    Yv12,
    I420,
    Yuy2,
    Uyvy,
}

impl FourCc {
    pub fn is_planar(self) -> bool {
        matches!(self, FourCc::Yv12 | FourCc::I420)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFrame {
    pub buffer: Buffer,
    pub id: FourCc,
    pub width: u32,
    pub height: u32,
    /// Chroma pitch, then luma pitch, for planar frames. Packed frames use `pitch[0]`.
    pub pitch: [u32; 2],
    #[serde(default)]
    pub u_offset: u32,
    #[serde(default)]
    pub v_offset: u32,
}

impl VideoFrame {
    pub fn kernel(&self) -> Kernel {
        if self.id.is_planar() {
            Kernel::VideoPlanar
        } else {
            Kernel::VideoPacked
        }
    }

    /// Binding-table entries: the destination plus every source plane.
    pub fn nr_surfaces(&self) -> u32 {
        1 + self.planes().len() as u32
    }

    /// Surfaces bound for sampling, in binding-table order.
    ///
    /// Planar frames bind luma twice, then V and U at half resolution, each twice.
    pub fn planes(&self) -> Vec<SurfaceDesc> {
        if self.id.is_planar() {
            let luma = SurfaceDesc {
                width: self.width,
                height: self.height,
                format: SurfaceFormat::R8Unorm,
                offset: 0,
                pitch: self.pitch[1],
            };
            let chroma = |offset| SurfaceDesc {
                width: self.width / 2,
                height: self.height / 2,
                format: SurfaceFormat::R8Unorm,
                offset,
                pitch: self.pitch[0],
            };
            vec![
                luma,
                luma,
                chroma(self.v_offset),
                chroma(self.v_offset),
                chroma(self.u_offset),
                chroma(self.u_offset),
            ]
        } else {
            let format = if self.id == FourCc::Uyvy {
                SurfaceFormat::YCrCbSwapY
            } else {
                SurfaceFormat::YCrCbNormal
            };
            vec![SurfaceDesc {
                width: self.width,
                height: self.height,
                format,
                offset: 0,
                pitch: self.pitch[0],
            }]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BufferId, Tiling};

    fn frame(id: FourCc) -> VideoFrame {
        VideoFrame {
            buffer: Buffer {
                id: BufferId(40),
                pitch: 0,
                tiling: Tiling::None,
            },
            id,
            width: 320,
            height: 240,
            pitch: [160, 320],
            u_offset: 320 * 240 + 160 * 120,
            v_offset: 320 * 240,
        }
    }

    #[test]
    fn planar_frames_bind_six_planes() {
        let frame = frame(FourCc::I420);
        let planes = frame.planes();
        assert_eq!(planes.len(), 6);
        assert_eq!(frame.nr_surfaces(), 7);
        assert_eq!(frame.kernel(), Kernel::VideoPlanar);
        assert_eq!((planes[0].width, planes[0].pitch), (320, 320));
        assert_eq!(planes[2].offset, frame.v_offset);
        assert_eq!(planes[5].offset, frame.u_offset);
        assert_eq!((planes[4].width, planes[4].height, planes[4].pitch), (160, 120, 160));
    }

    #[test]
    fn packed_frames_pick_the_swizzle() {
        let yuy2 = frame(FourCc::Yuy2);
        assert_eq!(yuy2.planes()[0].format, SurfaceFormat::YCrCbNormal);
        assert_eq!(yuy2.nr_surfaces(), 2);
        assert_eq!(yuy2.kernel(), Kernel::VideoPacked);
        assert_eq!(frame(FourCc::Uyvy).planes()[0].format, SurfaceFormat::YCrCbSwapY);
    }
}
