use std::{error::Error, fmt, num::ParseIntError};

/// Separates consecutive wall coordinates.
const ENTRY_DELIMITER: char = ';';
/// Separates the column from the row within one coordinate.
const AXIS_DELIMITER: char = ',';

/// Parses a layout such as `1,0;2,3` into raw `(x, y)` wall requests.
///
/// Coordinates are kept signed so that the simulation, not the parser, decides
/// what lies outside the grid. Empty entries are ignored.
pub(crate) fn parse_wall_layout(value: &str) -> Result<Vec<(i64, i64)>, WallLayoutError> {
    value
        .split(ENTRY_DELIMITER)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> Result<(i64, i64), WallLayoutError> {
    let (x, y) = entry
        .split_once(AXIS_DELIMITER)
        .ok_or_else(|| WallLayoutError::MissingRow(entry.to_owned()))?;
    let parse = |raw: &str| {
        raw.trim()
            .parse::<i64>()
            .map_err(|error| WallLayoutError::InvalidCoordinate(entry.to_owned(), error))
    };
    Ok((parse(x)?, parse(y)?))
}

/// Errors that can occur while parsing a wall layout.
#[derive(Debug)]
pub(crate) enum WallLayoutError {
    /// The entry did not contain a `column,row` pair.
    MissingRow(String),
    /// One half of the entry was not an integer.
    InvalidCoordinate(String, ParseIntError),
}

impl fmt::Display for WallLayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRow(entry) => write!(f, "wall '{entry}' is not a column,row pair"),
            Self::InvalidCoordinate(entry, error) => {
                write!(f, "wall '{entry}' has an invalid coordinate: {error}")
            }
        }
    }
}

impl Error for WallLayoutError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidCoordinate(_, error) => Some(error),
            Self::MissingRow(_) => None,
        }
    }
}
