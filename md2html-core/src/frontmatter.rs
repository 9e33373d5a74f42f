//! Leading YAML front matter.
//!
//! A document may open with a `---` line, a YAML mapping, and a closing `---`
//! line. Everything after the closing delimiter line is the Markdown body and
//! is returned byte-for-byte.

use serde_json::{Map, Value};
use thiserror::Error;

const DELIMITER: &str = "---";

/// Key-ordered front matter mapping. Absent front matter is an empty map.
pub type FrontMatter = Map<String, Value>;

#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("front matter must be a YAML mapping")]
    NotAMapping,
    #[error("unsupported front matter value: {0}")]
    Convert(#[from] serde_json::Error),
}

/// Split `text` into its front matter and the remaining body.
///
/// Text without an opening delimiter line, or without a matching closing
/// line, has no front matter and is returned unchanged.
pub fn split_front_matter(text: &str) -> Result<(FrontMatter, &str), FrontMatterError> {
    let mut lines = text.split_inclusive('\n');
    let Some(first) = lines.next() else {
        return Ok((FrontMatter::new(), text));
    };
    if first.trim_end() != DELIMITER {
        return Ok((FrontMatter::new(), text));
    }

    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if line.trim() == DELIMITER {
            let front_matter = parse_block(&text[block_start..offset])?;
            return Ok((front_matter, &text[offset + line.len()..]));
        }
        offset += line.len();
    }

    Ok((FrontMatter::new(), text))
}

/// Best-effort variant used where a broken header should not stop the caller:
/// on error the whole text is treated as body.
pub fn split_front_matter_lossy(text: &str) -> (FrontMatter, &str) {
    split_front_matter(text).unwrap_or_else(|_| (FrontMatter::new(), text))
}

fn parse_block(raw: &str) -> Result<FrontMatter, FrontMatterError> {
    if raw.trim().is_empty() {
        return Ok(FrontMatter::new());
    }

    match serde_yaml::from_str::<serde_yaml::Value>(raw)? {
        serde_yaml::Value::Null => Ok(FrontMatter::new()),
        serde_yaml::Value::Mapping(mapping) => match serde_json::to_value(mapping)? {
            Value::Object(map) => Ok(map),
            _ => Err(FrontMatterError::NotAMapping),
        },
        _ => Err(FrontMatterError::NotAMapping),
    }
}
