use chorus_core::PatternFlags;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// On-disk pattern record: flags are the legacy pipe-joined string, parsed
/// into a [`PatternFlags`] bitset once at load time (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    pub id: u32,
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
    #[serde(default)]
    pub url: String,
}

/// On-disk response record: a trigger text plus the patterns that fire it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub response_id: u32,
    pub response: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub note: String,
    pub patterns: Vec<PatternRecord>,
}

/// A pattern with its regex compiled. Carries the source and flags so the
/// rulebook can be serialised back without re-deriving them from the
/// `regex::Regex`, which doesn't expose its original flag set.
pub struct CompiledPattern {
    pub id: u32,
    pub name: String,
    pub source: String,
    pub flags: PatternFlags,
    pub url: String,
    pub regex: Regex,
}

/// A response with all of its patterns compiled. Responses whose every
/// pattern failed to compile are dropped at load time, never constructed.
pub struct CompiledResponse {
    pub response_id: u32,
    pub response: String,
    pub name: String,
    pub note: String,
    pub patterns: Vec<CompiledPattern>,
}

impl CompiledResponse {
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(text))
    }

    pub fn to_record(&self) -> ResponseRecord {
        ResponseRecord {
            response_id: self.response_id,
            response: self.response.clone(),
            name: self.name.clone(),
            note: self.note.clone(),
            patterns: self
                .patterns
                .iter()
                .map(|p| PatternRecord {
                    id: p.id,
                    name: p.name.clone(),
                    pattern: p.source.clone(),
                    flags: p.flags.to_pipe_str(),
                    url: p.url.clone(),
                })
                .collect(),
        }
    }
}

/// Compile one pattern record, applying §4.6's VERBOSE preprocessing pass
/// before handing the source to `RegexBuilder`.
pub fn compile_pattern(record: &PatternRecord) -> Result<CompiledPattern, regex::Error> {
    let flags = PatternFlags::from_pipe_str(&record.flags);
    let source = flags.strip_verbose_whitespace(&record.pattern);
    let mut builder = regex::RegexBuilder::new(&source);
    flags.apply(&mut builder);
    let regex = builder.build()?;
    Ok(CompiledPattern {
        id: record.id,
        name: record.name.clone(),
        source: record.pattern.clone(),
        flags,
        url: record.url.clone(),
        regex,
    })
}
