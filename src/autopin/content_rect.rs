//! Visible-content detection for letterboxed background surfaces.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Bounds, Size};

/// Sub-rectangle of a surface that shows actual image content.
pub type ContentRect = Bounds;

pub type DetectResult<T> = std::result::Result<T, DetectError>;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("background has no usable natural size: {0:?}")]
    InvalidNaturalSize(Size),
    #[error("background container has no usable box: {0:?}")]
    InvalidContainer(Bounds),
    #[error("background surface unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read image dimensions from {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// How the natural image is scaled into its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Contain,
    Cover,
    Fill,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionComponent {
    Percent(f64),
    Pixels(f64),
}

impl PositionComponent {
    fn offset(self, free_space: f64) -> f64 {
        match self {
            Self::Percent(percent) => free_space * percent / 100.0,
            Self::Pixels(pixels) => pixels,
        }
    }
}

/// Placement of the scaled image inside the free space of its container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectPosition {
    pub x: PositionComponent,
    pub y: PositionComponent,
}

impl Default for ObjectPosition {
    fn default() -> Self {
        Self {
            x: PositionComponent::Percent(50.0),
            y: PositionComponent::Percent(50.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidObjectPosition(pub String);

impl fmt::Display for InvalidObjectPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid object position: {:?}", self.0)
    }
}

impl std::error::Error for InvalidObjectPosition {}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Horizontal(PositionComponent),
    Vertical(PositionComponent),
    Either(PositionComponent),
}

fn parse_token(token: &str) -> Option<Token> {
    let token = token.to_ascii_lowercase();
    let keyword = match token.as_str() {
        "left" => Some(Token::Horizontal(PositionComponent::Percent(0.0))),
        "right" => Some(Token::Horizontal(PositionComponent::Percent(100.0))),
        "top" => Some(Token::Vertical(PositionComponent::Percent(0.0))),
        "bottom" => Some(Token::Vertical(PositionComponent::Percent(100.0))),
        "center" => Some(Token::Either(PositionComponent::Percent(50.0))),
        _ => None,
    };
    if keyword.is_some() {
        return keyword;
    }
    let component = if let Some(percent) = token.strip_suffix('%') {
        PositionComponent::Percent(percent.trim().parse().ok()?)
    } else if let Some(pixels) = token.strip_suffix("px") {
        PositionComponent::Pixels(pixels.trim().parse().ok()?)
    } else {
        let value: f64 = token.parse().ok()?;
        if value != 0.0 {
            return None;
        }
        PositionComponent::Pixels(0.0)
    };
    component_is_finite(component).then_some(Token::Either(component))
}

fn component_is_finite(component: PositionComponent) -> bool {
    match component {
        PositionComponent::Percent(value) | PositionComponent::Pixels(value) => value.is_finite(),
    }
}

impl FromStr for ObjectPosition {
    type Err = InvalidObjectPosition;

    /// Accepts one or two components: percentages, pixel lengths, `0`, or
    /// the keywords `left`, `center`, `right`, `top`, `bottom`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidObjectPosition(value.to_string());
        let center = PositionComponent::Percent(50.0);
        let tokens = value
            .split_whitespace()
            .map(parse_token)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid)?;

        let (x, y) = match tokens.as_slice() {
            [Token::Vertical(y)] => (center, *y),
            [Token::Horizontal(x) | Token::Either(x)] => (*x, center),
            [Token::Vertical(y), Token::Horizontal(x) | Token::Either(x)]
            | [Token::Horizontal(x) | Token::Either(x), Token::Vertical(y) | Token::Either(y)]
            | [Token::Either(y), Token::Horizontal(x)] => (*x, *y),
            _ => return Err(invalid()),
        };
        Ok(Self { x, y })
    }
}

/// Background capability used by [`ContentRectDetector`].
pub trait BackgroundSurface {
    /// Intrinsic pixel dimensions of the image.
    fn natural_size(&self) -> DetectResult<Size>;

    /// Rendered box of the container in host coordinates.
    fn container_box(&self) -> DetectResult<Bounds>;
}

/// Surface whose dimensions are pushed in by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredSurface {
    natural: Size,
    container: Bounds,
}

impl MeasuredSurface {
    pub const fn new(natural: Size, container: Bounds) -> Self {
        Self { natural, container }
    }

    pub fn set_container(&mut self, container: Bounds) {
        self.container = container;
    }

    pub fn set_natural_size(&mut self, natural: Size) {
        self.natural = natural;
    }
}

impl BackgroundSurface for MeasuredSurface {
    fn natural_size(&self) -> DetectResult<Size> {
        Ok(self.natural)
    }

    fn container_box(&self) -> DetectResult<Bounds> {
        Ok(self.container)
    }
}

/// Surface backed by an image file. The natural size is read from the file
/// header on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFileSurface {
    path: PathBuf,
    container: Bounds,
}

impl ImageFileSurface {
    pub fn new(path: impl Into<PathBuf>, container: Bounds) -> Self {
        Self {
            path: path.into(),
            container,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_container(&mut self, container: Bounds) {
        self.container = container;
    }
}

impl BackgroundSurface for ImageFileSurface {
    fn natural_size(&self) -> DetectResult<Size> {
        let (width, height) =
            image::image_dimensions(&self.path).map_err(|source| DetectError::Image {
                path: self.path.clone(),
                source,
            })?;
        Ok(Size::new(f64::from(width), f64::from(height)))
    }

    fn container_box(&self) -> DetectResult<Bounds> {
        Ok(self.container)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContentRectDetector {
    pub fit: FitMode,
    pub position: ObjectPosition,
}

impl ContentRectDetector {
    pub const fn new(fit: FitMode, position: ObjectPosition) -> Self {
        Self { fit, position }
    }

    /// Content rect in the container's local pixel space. Always measured
    /// fresh from the surface.
    pub fn detect(&self, surface: &dyn BackgroundSurface) -> DetectResult<ContentRect> {
        let natural = surface.natural_size()?;
        let container = surface.container_box()?;
        self.compute(natural, container.size())
            .map_err(|err| match err {
                DetectError::InvalidContainer(_) => DetectError::InvalidContainer(container),
                other => other,
            })
    }

    /// Content rect in host coordinates.
    pub fn detect_in_host(&self, surface: &dyn BackgroundSurface) -> DetectResult<ContentRect> {
        let container = surface.container_box()?;
        let local = self.detect(surface)?;
        Ok(Bounds::new(
            container.x + local.x,
            container.y + local.y,
            local.width,
            local.height,
        ))
    }

    pub fn compute(&self, natural: Size, container: Size) -> DetectResult<ContentRect> {
        if !natural.is_positive() {
            return Err(DetectError::InvalidNaturalSize(natural));
        }
        if !container.is_positive() {
            return Err(DetectError::InvalidContainer(Bounds::new(
                0.0,
                0.0,
                container.width,
                container.height,
            )));
        }

        let (width, height) = match self.fit {
            FitMode::Fill => (container.width, container.height),
            FitMode::None => (natural.width, natural.height),
            FitMode::Contain | FitMode::Cover => {
                let scale_x = container.width / natural.width;
                let scale_y = container.height / natural.height;
                let scale = if self.fit == FitMode::Contain {
                    scale_x.min(scale_y)
                } else {
                    scale_x.max(scale_y)
                };
                (natural.width * scale, natural.height * scale)
            }
        };

        Ok(Bounds::new(
            self.position.x.offset(container.width - width),
            self.position.y.offset(container.height - height),
            width,
            height,
        ))
    }
}
