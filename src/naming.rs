//! Output filename templates.
//!
//! A template is parsed once when the job is built and rendered for every
//! (image, profile) pair. The container extension is appended by the caller,
//! so `{name}_{profile}` for `photo.JPG` and profile `thumb` renders
//! `photo_thumb` and becomes `photo_thumb.jpg`.
//!
//! ## Tokens
//!
//! | Token | Value |
//! |---|---|
//! | `{name}` | input basename without extension |
//! | `{profile}` | output profile name |
//! | `{ext}` | input extension without the dot, as written |
//! | `{rand}` | 8 random lowercase alphanumerics, fresh per render |
//! | `{hash}` | first 12 hex digits of the SHA-256 of the source file |
//!
//! `{{` and `}}` produce literal braces. Anything else inside braces is a
//! [`TemplateError`].

use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const RAND_LEN: usize = 8;
const HASH_LEN: usize = 12;
const RAND_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown token {{{0}}} in filename format")]
    UnknownToken(String),
    #[error("unclosed '{{' in filename format")]
    Unclosed,
    #[error("unmatched '}}' in filename format")]
    UnmatchedClose,
    #[error("filename format is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Name,
    Profile,
    Ext,
    Rand,
    Hash,
}

/// A parsed filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    source: String,
    segments: Vec<Segment>,
}

/// Values for one render.
#[derive(Debug, Clone, Copy)]
pub struct TemplateValues<'a> {
    pub name: &'a str,
    pub profile: &'a str,
    pub ext: &'a str,
    /// Source file bytes, hashed only when the template uses `{hash}`.
    pub source: &'a [u8],
}

impl FilenameTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        if template.is_empty() {
            return Err(TemplateError::Empty);
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedClose),
                '{' => {
                    let mut token = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(t) => token.push(t),
                            None => return Err(TemplateError::Unclosed),
                        }
                    }
                    let segment = match token.as_str() {
                        "name" => Segment::Name,
                        "profile" => Segment::Profile,
                        "ext" => Segment::Ext,
                        "rand" => Segment::Rand,
                        "hash" => Segment::Hash,
                        _ => return Err(TemplateError::UnknownToken(token)),
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn render(&self, values: &TemplateValues<'_>) -> String {
        let mut out = String::new();
        let mut hash: Option<String> = None;
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Name => out.push_str(values.name),
                Segment::Profile => out.push_str(values.profile),
                Segment::Ext => out.push_str(values.ext),
                Segment::Rand => out.push_str(&random_token()),
                Segment::Hash => {
                    out.push_str(hash.get_or_insert_with(|| short_hash(values.source)));
                }
            }
        }
        out
    }
}

impl fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn random_token() -> String {
    let mut rng = rand::rng();
    (0..RAND_LEN)
        .map(|_| RAND_CHARSET[rng.random_range(0..RAND_CHARSET.len())] as char)
        .collect()
}

fn short_hash(bytes: &[u8]) -> String {
    let digest = format!("{:x}", Sha256::digest(bytes));
    digest[..HASH_LEN].to_string()
}
