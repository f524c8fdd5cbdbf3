use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Output voxel spacing in millimeters (x, y, z)
///
/// Spacing of the Cartesian grid produced by scan conversion. Axes can be
/// set independently; non-positive values fall back to 1.0 mm at conversion
/// time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSpacing {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl OutputSpacing {
    /// Creates a spacing with the same value on all axes
    pub fn uniform(value: f64) -> Self {
        Self {
            x: value,
            y: value,
            z: value,
        }
    }

    /// Parses output spacing from string
    ///
    /// Accepts a single value applied to all axes or three per-axis values:
    /// - "0.5"
    /// - "0.5,0.5,0.5"
    /// - "0.5 0.5 0.5"
    /// - Exponential notation: "5e-1"
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not contain one or three numbers
    pub fn parse(s: &str) -> Result<Self, String> {
        static REGEX: OnceLock<Regex> = OnceLock::new();
        let re = REGEX.get_or_init(|| {
            Regex::new(r"[-+]?\d*\.?\d+(?:[eE][-+]?\d+)?").expect("Failed to compile regex")
        });

        let numbers: Vec<f64> = re
            .find_iter(s)
            .map(|m| {
                m.as_str()
                    .parse()
                    .map_err(|e| format!("Failed to parse spacing value: {}", e))
            })
            .collect::<Result<_, _>>()?;

        match numbers[..] {
            [v] => Ok(Self::uniform(v)),
            [x, y, z] => Ok(Self { x, y, z }),
            _ => Err(format!(
                "Failed to parse OutputSpacing from '{}': expected 1 or 3 values",
                s
            )),
        }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Default for OutputSpacing {
    fn default() -> Self {
        Self::uniform(0.5)
    }
}

impl From<OutputSpacing> for [f64; 3] {
    fn from(s: OutputSpacing) -> Self {
        s.to_array()
    }
}

impl fmt::Display for OutputSpacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x {} x {} mm", self.x, self.y, self.z)
    }
}
