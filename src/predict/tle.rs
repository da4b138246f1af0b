use sgp4::{Constants, Elements};

use crate::predict::error::PredictError;

/// Parsed orbital elements ready for propagation.
pub struct OrbitModel {
    pub elements: Elements,
    pub constants: Constants,
}

impl OrbitModel {
    pub fn from_tle(tle: &str) -> Result<Self, PredictError> {
        let (name, line1, line2) = split_tle(tle)?;
        let elements = Elements::from_tle(name, line1.as_bytes(), line2.as_bytes())
            .map_err(|e| PredictError::InvalidTle(e.to_string()))?;
        let constants = Constants::from_elements(&elements)
            .map_err(|e| PredictError::InvalidTle(e.to_string()))?;
        Ok(Self {
            elements,
            constants,
        })
    }
}

/// Splits two- or three-line element text into an optional name and the
/// two element lines.
pub fn split_tle(tle: &str) -> Result<(Option<String>, String, String), PredictError> {
    let lines: Vec<&str> = tle
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();

    match lines.as_slice() {
        [line1, line2] if is_line(line1, '1') && is_line(line2, '2') => {
            Ok((None, line1.to_string(), line2.to_string()))
        }
        [name, line1, line2] if is_line(line1, '1') && is_line(line2, '2') => Ok((
            Some(name.trim().to_string()),
            line1.to_string(),
            line2.to_string(),
        )),
        _ => Err(PredictError::InvalidTle(format!(
            "expected 2 or 3 lines, got {}",
            lines.len()
        ))),
    }
}

fn is_line(line: &str, number: char) -> bool {
    let mut chars = line.trim_start().chars();
    chars.next() == Some(number) && chars.next() == Some(' ')
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const SWISSCUBE: &str = "SWISSCUBE\n1 35932U 09051B   12110.66765508  .00000638  00000-0  15500-3 0  5172\n2 35932  98.3348 213.8703 0006768 284.4795  75.6141 14.52927878136365";
}
