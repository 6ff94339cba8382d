use std::fmt;
use std::str::FromStr;

/// Stylization variant applied by the `stylization-v2` pipeline.
///
/// The named variants cover the pipelines the service is known to accept;
/// `Custom` passes an arbitrary pipeline id through untouched for when the
/// service ships new ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Style {
    Toon,
    Paint,
    Sketch,
    Pixel,
    Custom(String),
}

impl Style {
    /// Pipeline id as the remote API expects it.
    pub fn as_pipeline_id(&self) -> &str {
        match self {
            Style::Toon => "toon",
            Style::Paint => "paint",
            Style::Sketch => "sketch",
            Style::Pixel => "pixel",
            Style::Custom(id) => id,
        }
    }
}

impl FromStr for Style {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "toon" => Style::Toon,
            "paint" => Style::Paint,
            "sketch" => Style::Sketch,
            "pixel" => Style::Pixel,
            other => Style::Custom(other.to_string()),
        })
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_pipeline_id())
    }
}
