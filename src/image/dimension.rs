//! Axis descriptors.

/// What an image axis measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    Distance,
    Slice,
    Time,
    Wavelength,
}

impl DimensionKind {
    pub const fn default_unit(&self) -> &'static str {
        match self {
            DimensionKind::Distance => "pixels",
            DimensionKind::Slice => "#",
            DimensionKind::Time => "ms",
            DimensionKind::Wavelength => "nm",
        }
    }
}

/// Named axis with a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub kind: DimensionKind,
    pub unit: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, kind: DimensionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            unit: kind.default_unit().to_string(),
        }
    }

    pub fn distance(name: impl Into<String>) -> Self {
        Self::new(name, DimensionKind::Distance)
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Default x, y, z axes measured in pixels.
pub fn default_dimensions() -> [Dimension; 3] {
    [
        Dimension::distance("x"),
        Dimension::distance("y"),
        Dimension::distance("z"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_units() {
        assert_eq!(Dimension::distance("x").unit, "pixels");
        assert_eq!(Dimension::new("t", DimensionKind::Time).unit, "ms");
        assert_eq!(Dimension::new("s", DimensionKind::Slice).unit, "#");
        assert_eq!(
            Dimension::new("w", DimensionKind::Wavelength)
                .with_unit("um")
                .unit,
            "um"
        );
    }
}
