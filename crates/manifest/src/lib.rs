//! Stencil manifest decoder: splits rendered template output into documents.
//!
//! The stream may hold YAML documents separated by `---`, JSON objects (a JSON
//! document is valid YAML, so it can sit between markers), or, when the stream
//! opens with `{`, a run of concatenated JSON objects. Empty documents are
//! skipped; anything else that fails to parse ends the stream with an error.

#![forbid(unsafe_code)]

use serde::Deserialize;
use serde_json::Value as Json;
use stencil_core::{shape_of, Object};
use tracing::trace;

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(default)
}

/// Guards against pathological template output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Upper bound on the whole stream.
    pub max_bytes: usize,
    /// Upper bound on nodes in a single document.
    pub max_nodes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self { Self { max_bytes: 4 * 1024 * 1024, max_nodes: 100_000 } }
}

impl DecodeLimits {
    /// Defaults overridden by `STENCIL_MAX_MANIFEST_BYTES` / `STENCIL_MAX_MANIFEST_NODES`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_bytes: env_usize("STENCIL_MAX_MANIFEST_BYTES", d.max_bytes),
            max_nodes: env_usize("STENCIL_MAX_MANIFEST_NODES", d.max_nodes),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("manifest stream too large ({size} bytes > {max})")]
    TooLarge { size: usize, max: usize },
    #[error("document {index} too complex (>{max} nodes)")]
    TooComplex { index: usize, max: usize },
    #[error("document {index} is not valid YAML")]
    Yaml { index: usize, #[source] source: serde_yaml::Error },
    #[error("document {index} is not valid JSON")]
    Json { index: usize, #[source] source: serde_json::Error },
    #[error("document {index} cannot be represented as JSON")]
    Convert { index: usize, #[source] source: serde_json::Error },
    #[error("document {index}: expected a mapping, found {found}")]
    NotAnObject { index: usize, found: &'static str },
}

/// True when `v` has more than `max` nodes. Stops counting at `max + 1`.
fn node_budget_exceeded(v: &Json, max: usize) -> bool {
    fn count(v: &Json, seen: &mut usize, stop: usize) {
        *seen += 1;
        let children: Box<dyn Iterator<Item = &Json>> = match v {
            Json::Object(map) => Box::new(map.values()),
            Json::Array(arr) => Box::new(arr.iter()),
            _ => return,
        };
        for child in children {
            if *seen >= stop {
                return;
            }
            count(child, seen, stop);
        }
    }
    let mut seen = 0usize;
    count(v, &mut seen, max.saturating_add(1));
    seen > max
}

fn skip_whitespace(b: &[u8]) -> &[u8] {
    let start = b.iter().position(|c| !c.is_ascii_whitespace()).unwrap_or(b.len());
    &b[start..]
}

enum Mode<'a> {
    Json(serde_json::StreamDeserializer<'a, serde_json::de::SliceRead<'a>, Json>),
    Yaml(serde_yaml::Deserializer<'a>),
    Done,
}

impl<'a> Mode<'a> {
    fn start(input: &'a [u8]) -> Self {
        match skip_whitespace(input).first() {
            None => Mode::Done,
            Some(b'{') => Mode::Json(serde_json::Deserializer::from_slice(input).into_iter()),
            Some(_) => Mode::Yaml(serde_yaml::Deserializer::from_slice(input)),
        }
    }
}

/// Lazy iterator over the documents of a rendered stream. Fused after the
/// first error.
pub struct ManifestDecoder<'a> {
    input: &'a [u8],
    mode: Mode<'a>,
    seen: usize,
    max_nodes: usize,
}

impl<'a> ManifestDecoder<'a> {
    /// Decoder using limits from the environment.
    pub fn new(input: &'a [u8]) -> Result<Self, DecodeError> { Self::with_limits(input, DecodeLimits::from_env()) }

    pub fn with_limits(input: &'a [u8], limits: DecodeLimits) -> Result<Self, DecodeError> {
        if input.len() > limits.max_bytes {
            return Err(DecodeError::TooLarge { size: input.len(), max: limits.max_bytes });
        }
        Ok(Self { input, mode: Mode::start(input), seen: 0, max_nodes: limits.max_nodes })
    }

    fn finish(&self, index: usize, v: Json) -> Result<Object, DecodeError> {
        if node_budget_exceeded(&v, self.max_nodes) {
            return Err(DecodeError::TooComplex { index, max: self.max_nodes });
        }
        match v {
            Json::Object(o) => Ok(o),
            other => Err(DecodeError::NotAnObject { index, found: shape_of(&other) }),
        }
    }
}

impl<'a> Iterator for ManifestDecoder<'a> {
    type Item = Result<Object, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // 1-based position in the stream, counting skipped empty documents
            let index = self.seen + 1;
            let input: &'a [u8] = self.input;
            let decoded = match &mut self.mode {
                Mode::Done => return None,
                Mode::Json(stream) => match stream.next() {
                    None => None,
                    Some(Ok(v)) => Some(Ok(v)),
                    Some(Err(source)) => {
                        let resume = stream.byte_offset();
                        let rest = &input[resume..];
                        // a YAML flow mapping also opens with `{`
                        if resume == 0 || skip_whitespace(rest).starts_with(b"---") {
                            trace!(offset = resume, "JSON stream continues as YAML");
                            self.mode = Mode::Yaml(serde_yaml::Deserializer::from_slice(rest));
                            continue;
                        }
                        Some(Err(DecodeError::Json { index, source }))
                    }
                },
                Mode::Yaml(de) => de.next().map(|doc| {
                    let mut v = serde_yaml::Value::deserialize(doc).map_err(|source| DecodeError::Yaml { index, source })?;
                    // resolve `<<` merge keys
                    v.apply_merge().map_err(|source| DecodeError::Yaml { index, source })?;
                    serde_json::to_value(v).map_err(|source| DecodeError::Convert { index, source })
                }),
            };
            let item = match decoded {
                None => {
                    self.mode = Mode::Done;
                    return None;
                }
                Some(Ok(Json::Null)) => {
                    self.seen += 1;
                    trace!(index, "skipping empty document");
                    continue;
                }
                Some(Ok(v)) => {
                    self.seen += 1;
                    self.finish(index, v)
                }
                Some(Err(e)) => Err(e),
            };
            if item.is_err() {
                self.mode = Mode::Done;
            }
            return Some(item);
        }
    }
}

/// Decode a whole stream eagerly, failing on the first bad document.
pub fn decode_all(input: &[u8], limits: DecodeLimits) -> Result<Vec<Object>, DecodeError> {
    ManifestDecoder::with_limits(input, limits)?.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(s: &str) -> Result<Vec<Object>, DecodeError> { decode_all(s.as_bytes(), DecodeLimits::default()) }

    #[test]
    fn empty_and_blank_streams_yield_nothing() {
        assert!(decode("").unwrap().is_empty());
        assert!(decode("  \n\t\n").unwrap().is_empty());
        assert!(decode("---\n---\n").unwrap().is_empty());
        assert!(decode("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn yaml_documents_in_stream_order() {
        let docs = decode("apiVersion: v1\nkind: A\n---\napiVersion: v1\nkind: B\n---\napiVersion: v1\nkind: C\n").unwrap();
        let kinds: Vec<_> = docs.iter().map(|d| d["kind"].as_str().unwrap().to_string()).collect();
        assert_eq!(kinds, vec!["A", "B", "C"]);
    }

    #[test]
    fn keys_keep_document_order() {
        let docs = decode("zeta: 1\nalpha: 2\nmid: 3\n").unwrap();
        let keys: Vec<_> = docs[0].keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn concatenated_json_stream() {
        let docs = decode("{\"kind\":\"A\"}\n{\"kind\":\"B\"} {\"kind\":\"C\"}\n").unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2]["kind"], json!("C"));
    }

    #[test]
    fn json_then_yaml_mix() {
        let docs = decode("{\"kind\":\"A\"}\n---\nkind: B\n---\n{\"kind\": \"C\", \"spec\": {\"n\": 1}}\n").unwrap();
        let kinds: Vec<_> = docs.iter().map(|d| d["kind"].clone()).collect();
        assert_eq!(kinds, vec![json!("A"), json!("B"), json!("C")]);
        assert_eq!(docs[2]["spec"], json!({ "n": 1 }));
    }

    #[test]
    fn yaml_flow_mapping_is_not_mistaken_for_json() {
        let docs = decode("{kind: A, spec: {n: 1}}\n---\nkind: B\n").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["spec"], json!({ "n": 1 }));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let e = decode("kind: A\n---\nkind: [unclosed\n").unwrap_err();
        assert!(matches!(e, DecodeError::Yaml { index: 2, .. }), "e={:?}", e);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let e = decode("{\"kind\": \"A\"}\n{\"kind\": }").unwrap_err();
        assert!(matches!(e, DecodeError::Json { index: 2, .. }), "e={:?}", e);
    }

    #[test]
    fn scalar_document_is_rejected() {
        let e = decode("kind: A\n---\njust a string\n").unwrap_err();
        assert_eq!(e.to_string(), "document 2: expected a mapping, found string");
    }

    #[test]
    fn iterator_fuses_after_error() {
        let input = b"[1, 2]\n---\nkind: B\n";
        let mut it = ManifestDecoder::with_limits(input, DecodeLimits::default()).unwrap();
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    #[test]
    fn limits_are_enforced() {
        let e = decode_all(b"kind: A\n", DecodeLimits { max_bytes: 4, max_nodes: 10 }).unwrap_err();
        assert!(matches!(e, DecodeError::TooLarge { size: 8, max: 4 }));
        let e = decode_all(b"a: 1\nb: 2\nc: 3\n", DecodeLimits { max_bytes: 1024, max_nodes: 3 }).unwrap_err();
        assert!(matches!(e, DecodeError::TooComplex { index: 1, max: 3 }));
    }

    #[test]
    fn node_limit_is_inclusive() {
        // root plus three scalars
        let input = b"a: 1\nb: 2\nc: 3\n";
        assert_eq!(decode_all(input, DecodeLimits { max_bytes: 1024, max_nodes: 4 }).unwrap().len(), 1);
        assert!(decode_all(input, DecodeLimits { max_bytes: 1024, max_nodes: 3 }).is_err());
    }

    #[test]
    fn yaml_merge_keys_are_resolved() {
        let docs = decode("base: &b {x: 1, y: 0}\nspec:\n  <<: *b\n  y: 2\n").unwrap();
        assert_eq!(docs[0]["spec"], json!({ "x": 1, "y": 2 }));
    }

    #[test]
    fn node_budget_counts_nested_values() {
        // root, array, 1, 2, inner mapping, 3
        let v = json!({ "a": [1, 2, { "b": 3 }] });
        assert!(!node_budget_exceeded(&v, 10));
        assert!(!node_budget_exceeded(&v, 6));
        assert!(node_budget_exceeded(&v, 5));
        assert!(node_budget_exceeded(&json!({}), 0));
    }
}
