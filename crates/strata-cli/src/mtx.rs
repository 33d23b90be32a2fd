//! Parser for Matrix Market coordinate files.
//!
//! Only the sparse `coordinate` layout is read, with `real` or `integer`
//! values and `general` or `symmetric` symmetry:
//! ```text
//! %%MatrixMarket matrix coordinate real general
//! % comments
//! <rows> <cols> <entries>
//! <i> <j> <value>
//! ...
//! ```
//!
//! Indices in the file are 1-based. Symmetric files store the lower triangle
//! and are expanded on read.

use std::path::Path;

use strata_core::{MatrixError, RowBlockMatrix};
use thiserror::Error;

/// Errors during Matrix Market parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Unsupported Matrix Market variant: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid matrix: {0}")]
    Matrix(#[from] MatrixError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symmetry {
    General,
    Symmetric,
}

/// Read a Matrix Market file from disk.
pub fn read_matrix_market(path: &Path) -> Result<RowBlockMatrix<f64>, ParseError> {
    let content = std::fs::read_to_string(path)?;
    parse_matrix_market(&content)
}

/// Parse Matrix Market content into a single block that owns every row.
pub fn parse_matrix_market(content: &str) -> Result<RowBlockMatrix<f64>, ParseError> {
    let mut lines = content.lines().enumerate().map(|(idx, l)| (idx + 1, l.trim()));

    let Some((_, banner)) = lines.next() else {
        return Err(ParseError::FormatError {
            line: 1,
            message: "Empty file".into(),
        });
    };
    let symmetry = parse_banner(banner)?;

    let mut body = lines.filter(|(_, l)| !l.is_empty() && !l.starts_with('%'));
    let (size_line, size) = body.next().ok_or(ParseError::FormatError {
        line: 2,
        message: "Missing size line".into(),
    })?;
    let dims: Vec<usize> = size
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| ParseError::FormatError {
            line: size_line,
            message: format!("Expected 'rows cols entries', got '{size}'"),
        })?;
    let &[nrow, ncol, entries] = dims.as_slice() else {
        return Err(ParseError::FormatError {
            line: size_line,
            message: format!("Expected 3 sizes, got {}", dims.len()),
        });
    };
    if symmetry == Symmetry::Symmetric && nrow != ncol {
        return Err(ParseError::FormatError {
            line: size_line,
            message: format!("Symmetric matrix must be square, got {nrow} x {ncol}"),
        });
    }

    let mut triplets = Vec::with_capacity(entries);
    let mut seen = 0usize;
    for (line, text) in body {
        let parts: Vec<&str> = text.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(ParseError::FormatError {
                line,
                message: format!("Expected 'row col value', got '{text}'"),
            });
        }
        let i = parse_index(parts[0], nrow, line)?;
        let j = parse_index(parts[1], ncol, line)?;
        let v: f64 = parts[2].parse().map_err(|_| ParseError::FormatError {
            line,
            message: format!("Invalid value: {}", parts[2]),
        })?;
        triplets.push((i, j, v));
        if symmetry == Symmetry::Symmetric && i != j {
            triplets.push((j, i, v));
        }
        seen += 1;
    }

    if seen != entries {
        return Err(ParseError::FormatError {
            line: size_line,
            message: format!("Header says {entries} entries but found {seen}"),
        });
    }

    triplets.sort_by_key(|&(i, j, _)| (i, j));
    Ok(RowBlockMatrix::from_triplets(nrow, ncol, &triplets)?)
}

fn parse_banner(banner: &str) -> Result<Symmetry, ParseError> {
    let fields: Vec<String> = banner.split_whitespace().map(str::to_lowercase).collect();
    if fields.first().map(String::as_str) != Some("%%matrixmarket") || fields.len() < 5 {
        return Err(ParseError::FormatError {
            line: 1,
            message: format!("Expected a %%MatrixMarket banner, got '{banner}'"),
        });
    }
    if fields[1] != "matrix" || fields[2] != "coordinate" {
        return Err(ParseError::UnsupportedFormat(format!("{} {}", fields[1], fields[2])));
    }
    if fields[3] != "real" && fields[3] != "integer" {
        return Err(ParseError::UnsupportedFormat(format!("field '{}'", fields[3])));
    }
    match fields[4].as_str() {
        "general" => Ok(Symmetry::General),
        "symmetric" => Ok(Symmetry::Symmetric),
        other => Err(ParseError::UnsupportedFormat(format!("symmetry '{other}'"))),
    }
}

fn parse_index(token: &str, bound: usize, line: usize) -> Result<usize, ParseError> {
    match token.parse::<usize>() {
        Ok(k) if (1..=bound).contains(&k) => Ok(k - 1),
        _ => Err(ParseError::FormatError {
            line,
            message: format!("Index '{token}' outside 1..={bound}"),
        }),
    }
}
