use serde::{Deserialize, Serialize};

/// Non-stroking colour normalised to RGB components in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl FillColor {
    pub const BLACK: FillColor = FillColor {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    pub fn gray(g: f32) -> Self {
        Self::rgb(g, g, g)
    }

    pub fn cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self::rgb((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k))
    }

    /// Every component at or below `tolerance`
    pub fn is_near_black(&self, tolerance: f32) -> bool {
        self.r <= tolerance && self.g <= tolerance && self.b <= tolerance
    }
}

/// Colour space selected for non-stroking operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Pattern,
    /// Indexed, Separation, DeviceN, Lab and anything unresolved
    Unsupported,
}

impl ColorSpace {
    pub fn from_device_name(name: &[u8]) -> Option<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Some(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            b"Pattern" => Some(ColorSpace::Pattern),
            _ => None,
        }
    }

    pub fn from_component_count(n: i64) -> Self {
        match n {
            1 => ColorSpace::Gray,
            3 => ColorSpace::Rgb,
            4 => ColorSpace::Cmyk,
            _ => ColorSpace::Unsupported,
        }
    }

    /// Colour in effect right after `cs` selects this space
    pub fn initial_color(self) -> Option<FillColor> {
        match self {
            ColorSpace::Gray | ColorSpace::Rgb | ColorSpace::Cmyk => Some(FillColor::BLACK),
            ColorSpace::Pattern | ColorSpace::Unsupported => None,
        }
    }

    /// Interpret `sc`/`scn` operands in this space
    pub fn color_from(self, components: &[f32]) -> Option<FillColor> {
        match (self, components) {
            (ColorSpace::Gray, [g, ..]) => Some(FillColor::gray(*g)),
            (ColorSpace::Rgb, [r, g, b, ..]) => Some(FillColor::rgb(*r, *g, *b)),
            (ColorSpace::Cmyk, [c, m, y, k, ..]) => Some(FillColor::cmyk(*c, *m, *y, *k)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_black_boundary() {
        assert!(FillColor::rgb(0.05, 0.05, 0.05).is_near_black(0.05));
        assert!(!FillColor::rgb(0.06, 0.0, 0.0).is_near_black(0.05));
    }

    #[test]
    fn test_cmyk_full_key_is_black() {
        assert!(FillColor::cmyk(0.0, 0.0, 0.0, 1.0).is_near_black(0.05));
        assert!(!FillColor::cmyk(1.0, 0.0, 0.0, 0.0).is_near_black(0.05));
    }

    #[test]
    fn test_component_mismatch_gives_no_colour() {
        assert_eq!(ColorSpace::Rgb.color_from(&[0.0]), None);
        assert_eq!(ColorSpace::Pattern.color_from(&[0.0, 0.0, 0.0]), None);
        assert_eq!(ColorSpace::Gray.color_from(&[0.5]), Some(FillColor::gray(0.5)));
    }
}
