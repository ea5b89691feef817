use pbmg::core::grid::{GridField, GridTopology};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

const VALUES_PER_LINE: usize = 3;

#[derive(Debug, Error)]
pub enum DxError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Missing '{0}' record")]
    MissingRecord(&'static str),
    #[error("Only axis-aligned grids are supported (delta lines must be diagonal)")]
    NonAxisAligned,
    #[error("Expected {expected} data values, found {found}")]
    ValueCount { expected: usize, found: usize },
}

/// OpenDX scalar fields on regular grids, as written by common electrostatics tools.
///
/// Data are ordered with z varying fastest and x slowest.
pub struct DxFile;

impl DxFile {
    pub fn read_from(reader: &mut impl BufRead) -> Result<GridField, DxError> {
        let mut dims: Option<[usize; 3]> = None;
        let mut origin: Option<[f64; 3]> = None;
        let mut deltas: Vec<[f64; 3]> = Vec::with_capacity(3);
        let mut expected: Option<usize> = None;
        let mut data: Vec<f64> = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parse_error = |message: String| DxError::Parse {
                line: line_num + 1,
                message,
            };

            if let Some(total) = expected {
                if data.len() < total {
                    for token in trimmed.split_whitespace() {
                        let value = token
                            .parse::<f64>()
                            .map_err(|_| parse_error(format!("invalid data value '{}'", token)))?;
                        data.push(value);
                    }
                    continue;
                }
            }

            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            match tokens.first().copied() {
                Some("object") if trimmed.contains("gridpositions") => {
                    let counts = trailing_numbers::<usize>(&tokens, "counts")
                        .ok_or_else(|| parse_error("malformed gridpositions counts".to_string()))?;
                    dims = Some(counts);
                }
                Some("object") if trimmed.contains("class array") => {
                    let items = tokens
                        .iter()
                        .position(|&t| t == "items")
                        .and_then(|p| tokens.get(p + 1))
                        .and_then(|t| t.parse::<usize>().ok())
                        .ok_or_else(|| parse_error("array record lacks an item count".to_string()))?;
                    data.reserve(items);
                    expected = Some(items);
                }
                Some("origin") => {
                    origin = Some(
                        trailing_numbers::<f64>(&tokens, "origin")
                            .ok_or_else(|| parse_error("malformed origin".to_string()))?,
                    );
                }
                Some("delta") => {
                    deltas.push(
                        trailing_numbers::<f64>(&tokens, "delta")
                            .ok_or_else(|| parse_error("malformed delta".to_string()))?,
                    );
                }
                _ => {}
            }
        }

        let dims = dims.ok_or(DxError::MissingRecord("gridpositions"))?;
        let origin = origin.ok_or(DxError::MissingRecord("origin"))?;
        let expected = expected.ok_or(DxError::MissingRecord("array"))?;
        if deltas.len() != 3 {
            return Err(DxError::MissingRecord("delta"));
        }
        let mut spacing = [0.0; 3];
        for (d, delta) in deltas.iter().enumerate() {
            if (0..3).any(|e| e != d && delta[e] != 0.0) {
                return Err(DxError::NonAxisAligned);
            }
            spacing[d] = delta[d];
        }

        let topology = GridTopology::new(dims, spacing, origin);
        if expected != topology.len() || data.len() != expected {
            return Err(DxError::ValueCount {
                expected: topology.len(),
                found: data.len(),
            });
        }

        let [_, ny, nz] = dims;
        let mut values = vec![0.0; topology.len()];
        for (n, value) in data.into_iter().enumerate() {
            let k = n % nz;
            let j = (n / nz) % ny;
            let i = n / (nz * ny);
            values[topology.index(i, j, k)] = value;
        }
        GridField::from_values(topology, values).map_err(|e| DxError::Parse {
            line: 0,
            message: e.to_string(),
        })
    }

    pub fn read_from_path(path: &Path) -> Result<GridField, DxError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }

    pub fn write_to(field: &GridField, comment: &str, writer: &mut impl Write) -> io::Result<()> {
        let topology = field.topology();
        let [nx, ny, nz] = topology.dims;
        let [ox, oy, oz] = topology.origin;
        let [hx, hy, hz] = topology.spacing;

        for line in comment.lines() {
            writeln!(writer, "# {}", line)?;
        }
        writeln!(writer, "object 1 class gridpositions counts {} {} {}", nx, ny, nz)?;
        writeln!(writer, "origin {:e} {:e} {:e}", ox, oy, oz)?;
        writeln!(writer, "delta {:e} 0.000000e0 0.000000e0", hx)?;
        writeln!(writer, "delta 0.000000e0 {:e} 0.000000e0", hy)?;
        writeln!(writer, "delta 0.000000e0 0.000000e0 {:e}", hz)?;
        writeln!(writer, "object 2 class gridconnections counts {} {} {}", nx, ny, nz)?;
        writeln!(
            writer,
            "object 3 class array type double rank 0 items {} data follows",
            topology.len()
        )?;

        let values = field.values();
        let mut column = 0;
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    if column > 0 {
                        write!(writer, " ")?;
                    }
                    write!(writer, "{:.6e}", values[topology.index(i, j, k)])?;
                    column += 1;
                    if column == VALUES_PER_LINE {
                        writeln!(writer)?;
                        column = 0;
                    }
                }
            }
        }
        if column != 0 {
            writeln!(writer)?;
        }

        writeln!(writer, "attribute \"dep\" string \"positions\"")?;
        writeln!(
            writer,
            "object \"regular positions regular connections\" class field"
        )?;
        writeln!(writer, "component \"positions\" value 1")?;
        writeln!(writer, "component \"connections\" value 2")?;
        writeln!(writer, "component \"data\" value 3")?;
        Ok(())
    }

    pub fn write_to_path(field: &GridField, comment: &str, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write_to(field, comment, &mut writer)?;
        writer.flush()
    }
}

/// The three numbers following `keyword` in a tokenized record.
fn trailing_numbers<T: std::str::FromStr + Copy + Default>(
    tokens: &[&str],
    keyword: &str,
) -> Option<[T; 3]> {
    let start = tokens.iter().position(|&t| t == keyword)? + 1;
    let slice = tokens.get(start..start + 3)?;
    let mut out = [T::default(); 3];
    for (slot, token) in out.iter_mut().zip(slice) {
        *slot = token.parse().ok()?;
    }
    Some(out)
}
