use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use crate::board::Position;

/// Characters `Position::from_str` reads as a cell.
fn is_cell(c: char) -> bool {
    matches!(c, 'X' | 'x' | 'O' | 'o' | '-' | '.')
}

/// Parse one position: 36 cells of `X`, `O`, `-` (or `x`, `o`, `.`) with an optional
/// trailing `*` for a middle position. Whitespace and other separators are ignored.
pub fn parse_line_to_position(line: &str) -> Option<Position> {
    let filtered: String = line.chars().filter(|&c| is_cell(c) || c == '*').collect();
    filtered.parse().ok()
}

/// Read one position per line. Lines without 36 cells are skipped, but a 36-cell
/// line that is not a valid position is an error.
pub fn parse_file_to_positions(path: &Path) -> io::Result<Vec<Position>> {
    let reader = BufReader::new(File::open(path)?);
    let mut positions = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let cells = line.chars().filter(|&c| is_cell(c)).count();
        if cells != 36 {
            continue;
        }
        match parse_line_to_position(&line) {
            Some(position) => positions.push(position),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{}:{}: invalid position {:?}", path.display(), number + 1, line.trim()),
                ))
            }
        }
    }
    Ok(positions)
}

/// Write `position value` lines.
pub fn write_values<W: Write>(out: &mut W, values: &[(Position, i32)]) -> io::Result<()> {
    for (position, value) in values {
        writeln!(out, "{position} {value}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_are_ignored() {
        let spaced = "X O - - - -\n".repeat(6);
        let position = parse_line_to_position(&spaced.replace('\n', " ")).unwrap();
        assert_eq!(position.count(), 12);
        assert!(!position.middle);
        assert!(parse_line_to_position("X O").is_none());
    }

    #[test]
    fn lowercase_and_dotted_lines_are_read() {
        let dotted = format!("xo{}", ".".repeat(34));
        assert_eq!(
            parse_line_to_position(&dotted),
            parse_line_to_position(&format!("XO{}", "-".repeat(34)))
        );

        let path = std::env::temp_dir().join(format!("pentago-mid-io-{}.txt", std::process::id()));
        std::fs::write(&path, format!("# header\n{dotted}\nX{}*\n", "-".repeat(35))).unwrap();
        let positions = parse_file_to_positions(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].count(), 2);
        assert!(positions[1].middle);
    }

    #[test]
    fn values_round_trip_through_text() {
        let position = parse_line_to_position(&format!("X{}*", "-".repeat(35))).unwrap();
        let mut out = Vec::new();
        write_values(&mut out, &[(position, -1)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let (cells, value) = text.trim().split_once(' ').unwrap();
        assert_eq!(parse_line_to_position(cells), Some(position));
        assert_eq!(value, "-1");
    }
}
