use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde_json::{Map, Number, Value};

use super::{
    sync::{sorted, validated_entries, write_atomically, ConfigSynchronizer, SyncError},
    RegistryMap,
};
use crate::data_model::AssetDescriptor;

const INDENT: &str = "  ";

/// Keeps the registry in a generated region of a hand-maintained source
/// file. The region starts right after `marker` and ends at the first
/// closing brace in column zero; text outside it is never touched.
pub struct MarkerSpliceSynchronizer {
    path: PathBuf,
    marker: String,
}

impl MarkerSpliceSynchronizer {
    pub fn new(path: &Path, marker: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            marker: marker.to_string(),
        }
    }

    fn marker_not_found(&self) -> SyncError {
        SyncError::MarkerNotFound {
            path: self.path.clone(),
            marker: self.marker.clone(),
        }
    }

    /// Byte range of the object literal following the marker.
    fn locate_region(&self, text: &str) -> Result<(usize, usize), SyncError> {
        let start = text
            .find(&self.marker)
            .map(|index| index + self.marker.len())
            .ok_or_else(|| self.marker_not_found())?;
        let rest = &text[start..];
        if rest.starts_with("{}") {
            return Ok((start, start + 2));
        }
        if !rest.starts_with('{') {
            return Err(SyncError::UnterminatedRegion {
                path: self.path.clone(),
                marker: self.marker.clone(),
            });
        }
        rest.find("\n}")
            .map(|index| (start, start + index + 2))
            .ok_or_else(|| SyncError::UnterminatedRegion {
                path: self.path.clone(),
                marker: self.marker.clone(),
            })
    }
}

#[async_trait]
impl ConfigSynchronizer for MarkerSpliceSynchronizer {
    async fn load(&self) -> Result<RegistryMap, SyncError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let (start, end) = self.locate_region(&text)?;
        let parse_error = |message: String| SyncError::Parse {
            path: self.path.clone(),
            message,
        };
        let value = LiteralParser::new(&text[start..end])
            .parse_document()
            .map_err(parse_error)?;
        let entries: BTreeMap<String, AssetDescriptor> =
            serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;
        validated_entries(&self.path, entries)
    }

    async fn persist(&self, snapshot: &RegistryMap) -> Result<(), SyncError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let (start, end) = self.locate_region(&text)?;
        let literal = render_literal(&serde_json::to_value(sorted(snapshot))?, 0);

        let mut spliced = String::with_capacity(text.len() + literal.len());
        spliced.push_str(&text[..start]);
        spliced.push_str(&literal);
        spliced.push_str(&text[end..]);
        write_atomically(&self.path, spliced.as_bytes()).await
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn render_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        format!("[{}]", quote(key))
    }
}

/// Renders a JSON value as an object literal with single-quoted strings,
/// two-space indentation and trailing commas.
pub fn render_literal(value: &Value, depth: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(|v| render_literal(v, depth)).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(map) => {
            let inner = INDENT.repeat(depth + 1);
            let mut out = String::from("{\n");
            for (key, value) in map {
                out.push_str(&format!(
                    "{}{}: {},\n",
                    inner,
                    render_key(key),
                    render_literal(value, depth + 1)
                ));
            }
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
            out
        }
    }
}

/// Parser for the subset of object-literal syntax `render_literal` emits,
/// tolerant of double quotes, bare keys and `//` comments added by hand.
struct LiteralParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_document(mut self) -> Result<Value, String> {
        let value = self.parse_value()?;
        self.skip_trivia();
        if self.pos != self.input.len() {
            return Err(format!("unexpected trailing input at offset {}", self.pos));
        }
        Ok(value)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn consume(&mut self, expected: char) -> Result<(), String> {
        self.skip_trivia();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!(
                "expected `{}` but found `{}` at offset {}",
                expected, c, self.pos
            )),
            None => Err(format!("expected `{}` but input ended", expected)),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = &self.input[self.pos..];
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("//") {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                return;
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, String> {
        self.skip_trivia();
        match self.peek() {
            Some('{') => self.parse_object(),
            Some('[') => self.parse_array(),
            Some('\'') | Some('"') => self.parse_string().map(Value::String),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(_) => {
                let word = self.parse_word();
                match word.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" | "undefined" => Ok(Value::Null),
                    _ => Err(format!("unexpected token `{}` at offset {}", word, self.pos)),
                }
            }
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn parse_word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                self.bump();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.bump();
            } else {
                break;
            }
        }
        let raw = &self.input[start..self.pos];
        if let Ok(n) = raw.parse::<i64>() {
            return Ok(Value::Number(n.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number `{}`", raw))
    }

    fn parse_string(&mut self) -> Result<String, String> {
        let quote = self.bump().ok_or("unexpected end of input")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err("unterminated escape".to_string()),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, String> {
        self.skip_trivia();
        match self.peek() {
            Some('[') => {
                self.bump();
                self.skip_trivia();
                let key = self.parse_string()?;
                self.consume(']')?;
                Ok(key)
            }
            Some('\'') | Some('"') => self.parse_string(),
            _ => {
                let key = self.parse_word();
                if key.is_empty() {
                    Err(format!("expected a key at offset {}", self.pos))
                } else {
                    Ok(key)
                }
            }
        }
    }

    fn parse_object(&mut self) -> Result<Value, String> {
        self.consume('{')?;
        let mut map = Map::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some('}') {
                self.bump();
                return Ok(Value::Object(map));
            }
            let key = self.parse_key()?;
            self.consume(':')?;
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {}
                _ => return Err(format!("expected `,` or `}}` at offset {}", self.pos)),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, String> {
        self.consume('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(']') {
                self.bump();
                return Ok(Value::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {}
                _ => return Err(format!("expected `,` or `]` at offset {}", self.pos)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_model::{
            test_objects::tests::{mock_hero_descriptor, TEST_PLACEHOLDER},
            Area,
            AssetDescriptorBuilder,
            MediaKind,
        },
        registry::sync::default_marker,
    };

    const SOURCE: &str = "import type { MediaRegistry } from './types';\n\n\
// generated below\n\
export const mediaRegistry: MediaRegistry = {\n\
  'legacy': {\n    id: 'old/asset',\n    kind: 'image',\n  },\n\
};\n\n\
export function helper() {\n  return 1;\n}\n";

    fn team_descriptor() -> AssetDescriptor {
        AssetDescriptorBuilder::default()
            .id("team/alex-photo")
            .kind(MediaKind::Image)
            .area(Some(Area::Team))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_persist_splices_only_generated_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.ts");
        std::fs::write(&path, SOURCE).unwrap();
        let sync = MarkerSpliceSynchronizer::new(&path, &default_marker());

        let snapshot = RegistryMap::new()
            .update(TEST_PLACEHOLDER.to_string(), mock_hero_descriptor())
            .update("team-photo".to_string(), team_descriptor());
        sync.persist(&snapshot).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("import type { MediaRegistry } from './types';\n\n// generated below\n"));
        assert!(text.ends_with("};\n\nexport function helper() {\n  return 1;\n}\n"));
        assert!(text.contains("  ['team-photo']: {\n"));
        assert!(text.contains("  ['hero.main']: {\n"));
        assert!(text.contains("    id: 'hero/main-img',\n"));
        assert!(text.contains("    area: 'team',\n"));
        assert!(!text.contains("legacy"));
        assert!(!text.contains('"'));

        assert_eq!(sync.load().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_missing_marker_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.ts");
        let original = "export const somethingElse = {\n};\n";
        std::fs::write(&path, original).unwrap();
        let sync = MarkerSpliceSynchronizer::new(&path, &default_marker());

        let snapshot = RegistryMap::unit(TEST_PLACEHOLDER.to_string(), mock_hero_descriptor());
        let err = sync.persist(&snapshot).await.unwrap_err();
        assert!(matches!(err, SyncError::MarkerNotFound { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), original.as_bytes());
    }

    #[tokio::test]
    async fn test_empty_region_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.ts");
        std::fs::write(&path, format!("{}{{}};\n", default_marker())).unwrap();
        let sync = MarkerSpliceSynchronizer::new(&path, &default_marker());
        assert!(sync.load().await.unwrap().is_empty());

        sync.persist(&RegistryMap::new()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("{}{{}};\n", default_marker())
        );
    }

    #[test]
    fn test_parser_accepts_hand_edited_literal() {
        let value = LiteralParser::new(
            "{\n  // hero\n  \"hero.main\": { id: \"a/b\", kind: 'video', defaultOptions: { width: 640, quality: 80 } },\n}",
        )
        .parse_document()
        .unwrap();
        assert_eq!(value["hero.main"]["kind"], "video");
        assert_eq!(value["hero.main"]["defaultOptions"]["width"], 640);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("media.ts");
        std::fs::write(
            &path,
            format!(
                "{}{{\n  'cover': {{\n    id: 'a/b',\n    kind: 'image',\n    dimensions: {{ width: 0, height: 9 }},\n  }},\n}};\n",
                default_marker()
            ),
        )
        .unwrap();
        let err = MarkerSpliceSynchronizer::new(&path, &default_marker())
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));
        assert!(err.to_string().contains("cover"));
    }
}
