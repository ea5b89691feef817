use nalgebra::Point3;
use pbmg::core::models::atom::Atom;
use pbmg::core::models::molecule::Molecule;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PqrError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: PqrParseErrorKind },
    #[error("File contains no ATOM or HETATM records")]
    NoAtoms,
}

#[derive(Debug, Error, PartialEq)]
pub enum PqrParseErrorKind {
    #[error("Record has {0} fields; expected at least 5 trailing x y z charge radius fields")]
    TooFewFields(usize),
    #[error("Invalid float in {field} (value: '{value}')")]
    InvalidFloat { field: &'static str, value: String },
    #[error("Radius must be non-negative, got {0}")]
    NegativeRadius(f64),
}

const TRAILING_FIELDS: [&str; 5] = ["x", "y", "z", "charge", "radius"];

/// Whitespace-delimited PQR reader.
///
/// Only the last five fields of each `ATOM`/`HETATM` record (coordinates, charge, radius)
/// are interpreted, so records with or without a chain identifier parse alike.
pub struct PqrFile;

impl PqrFile {
    pub fn read_from(reader: &mut impl BufRead, name: &str) -> Result<Molecule, PqrError> {
        let mut atoms = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let record = line.split_whitespace().next().unwrap_or("");
            if record != "ATOM" && record != "HETATM" {
                continue;
            }
            let atom = parse_atom(&line).map_err(|kind| PqrError::Parse {
                line: line_num + 1,
                kind,
            })?;
            atoms.push(atom);
        }
        if atoms.is_empty() {
            return Err(PqrError::NoAtoms);
        }
        Ok(Molecule::new(name, atoms))
    }

    pub fn read_from_path(path: &Path) -> Result<Molecule, PqrError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader, &name)
    }
}

fn parse_atom(line: &str) -> Result<Atom, PqrParseErrorKind> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // Record name, serial and atom name precede the trailing block.
    if fields.len() < TRAILING_FIELDS.len() + 3 {
        return Err(PqrParseErrorKind::TooFewFields(fields.len()));
    }
    let tail = &fields[fields.len() - TRAILING_FIELDS.len()..];
    let mut values = [0.0; 5];
    for (slot, (&field, &raw)) in values.iter_mut().zip(TRAILING_FIELDS.iter().zip(tail)) {
        *slot = raw
            .parse::<f64>()
            .map_err(|_| PqrParseErrorKind::InvalidFloat {
                field,
                value: raw.to_string(),
            })?;
    }
    let [x, y, z, charge, radius] = values;
    if radius < 0.0 {
        return Err(PqrParseErrorKind::NegativeRadius(radius));
    }
    Ok(Atom::new(Point3::new(x, y, z), charge, radius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
REMARK   1 generated for testing
ATOM      1  N   ALA A   1      -1.000   0.500   2.250 -0.3000 1.8240
ATOM      2  CA  ALA     1       0.000   0.000   0.000  0.1000 1.9080
HETATM    3  NA  ION     2      10.000 -10.000   5.000  1.0000 1.8680
TER
END
";

    #[test]
    fn reads_atoms_with_and_without_chain_ids() {
        let molecule = PqrFile::read_from(&mut Cursor::new(SAMPLE), "sample").unwrap();
        assert_eq!(molecule.name, "sample");
        assert_eq!(molecule.len(), 3);
        let first = &molecule.atoms()[0];
        assert_eq!(first.coords(), [-1.0, 0.5, 2.25]);
        assert_eq!(first.charge, -0.3);
        assert_eq!(first.radius, 1.824);
        assert_eq!(molecule.atoms()[2].charge, 1.0);
        assert!((molecule.total_charge() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn bad_float_reports_line_and_field() {
        let text = "ATOM 1 N ALA 1 0.0 abc 0.0 1.0 1.5\n";
        let err = PqrFile::read_from(&mut Cursor::new(text), "bad").unwrap_err();
        match err {
            PqrError::Parse { line, kind } => {
                assert_eq!(line, 1);
                assert_eq!(
                    kind,
                    PqrParseErrorKind::InvalidFloat {
                        field: "y",
                        value: "abc".to_string()
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn short_record_is_rejected() {
        let text = "REMARK\nATOM 1 0.0 0.0 0.0\n";
        let err = PqrFile::read_from(&mut Cursor::new(text), "short").unwrap_err();
        assert!(matches!(
            err,
            PqrError::Parse {
                line: 2,
                kind: PqrParseErrorKind::TooFewFields(5)
            }
        ));
    }

    #[test]
    fn negative_radius_is_rejected() {
        let text = "ATOM 1 N ALA 1 0.0 0.0 0.0 1.0 -1.5\n";
        let err = PqrFile::read_from(&mut Cursor::new(text), "neg").unwrap_err();
        assert!(matches!(
            err,
            PqrError::Parse {
                kind: PqrParseErrorKind::NegativeRadius(_),
                ..
            }
        ));
    }

    #[test]
    fn file_without_atoms_is_an_error() {
        let err = PqrFile::read_from(&mut Cursor::new("REMARK only\nEND\n"), "empty").unwrap_err();
        assert!(matches!(err, PqrError::NoAtoms));
    }

    #[test]
    fn reading_from_path_uses_the_file_stem_as_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ligand.pqr");
        std::fs::write(&path, SAMPLE).unwrap();
        let molecule = PqrFile::read_from_path(&path).unwrap();
        assert_eq!(molecule.name, "ligand");
        assert_eq!(molecule.len(), 3);
    }
}
