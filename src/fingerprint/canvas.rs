use super::radix::to_radix_string;

/// One paint operation of the fingerprint scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
    FillRect {
        style: &'static str,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    FillText {
        style: &'static str,
        text: &'static str,
        x: f64,
        y: f64,
    },
}

/// Fixed drawing routine rasterized by the host. Overlapping translucent text
/// over a solid block exercises font hinting, antialiasing and blending, which
/// is where GPUs and font stacks disagree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasScene {
    pub width: u32,
    pub height: u32,
    pub text_baseline: &'static str,
    pub font: &'static str,
    pub ops: &'static [DrawOp],
}

pub const FINGERPRINT_SCENE: CanvasScene = CanvasScene {
    width: 200,
    height: 50,
    text_baseline: "top",
    font: "14px Arial",
    ops: &[
        DrawOp::FillRect {
            style: "#f60",
            x: 0.0,
            y: 0.0,
            width: 62.0,
            height: 20.0,
        },
        DrawOp::FillText {
            style: "#069",
            text: "Cwm fjord",
            x: 2.0,
            y: 15.0,
        },
        DrawOp::FillText {
            style: "rgba(102,204,0,0.7)",
            text: "Cwm fjord",
            x: 4.0,
            y: 17.0,
        },
    ],
};

/// Polynomial rolling hash (`h = h * 31 + unit`, 32-bit wrapping) over the
/// UTF-16 code units of `serialized`.
pub fn rolling_hash(serialized: &str) -> i32 {
    serialized
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_mul(31).wrapping_add(i32::from(unit))
        })
}

/// Hash of a serialized bitmap, base-36 encoded with a leading `-` for
/// negative values.
pub fn canvas_hash(serialized: &str) -> String {
    to_radix_string(f64::from(rolling_hash(serialized)), 36)
}
