//! テンプレート展開
//!
//! 名前からリテラルまたは遅延値参照へのマッピングを、全ての参照が確定した後に
//! 最終的な設定 (環境変数の集合など) へ展開します。
//!
//! 機密属性の値はリテラルとして埋め込まず、`#{secret:<node>/<attribute>}`
//! 形式の間接参照として出力します。実際の値はプロバイダー側のシークレット
//! ストアから実行時に解決される前提です。

use crate::deferred::Deferred;
use crate::error::{Result, StackError};
use crate::value::{ConfigValue, to_text};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// 機密値の間接参照を生成
pub fn secret_indirection(d: &Deferred) -> String {
    format!("#{{secret:{}/{}}}", d.producer(), d.attribute())
}

/// 展開前のテンプレート
#[derive(Debug, Clone, Default)]
pub struct Template {
    entries: IndexMap<String, ConfigValue>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ConfigValue>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &ConfigValue> {
        self.entries.values()
    }

    /// テンプレートを展開する
    ///
    /// 未確定の参照が一つでもあれば `UnresolvedReference` で失敗します。
    /// 待機やポーリングは行いません。
    pub fn interpolate(&self) -> Result<ResolvedConfiguration> {
        interpolate(self)
    }
}

impl<K, V> FromIterator<(K, V)> for Template
where
    K: Into<String>,
    V: Into<ConfigValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 展開済みの設定
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedConfiguration {
    entries: IndexMap<String, String>,
    /// 間接参照として出力されたエントリ名
    #[serde(skip_serializing_if = "Vec::is_empty")]
    indirect: Vec<String>,
}

impl ResolvedConfiguration {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 機密値の間接参照を含むエントリか
    pub fn is_indirect(&self, name: &str) -> bool {
        self.indirect.iter().any(|n| n == name)
    }

    /// `KEY=value` 形式の行
    pub fn to_env_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

impl fmt::Display for ResolvedConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.to_env_lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// テンプレートを展開
#[tracing::instrument(level = "debug", skip(template), fields(entries = template.len()))]
pub fn interpolate(template: &Template) -> Result<ResolvedConfiguration> {
    // 先に全参照の確定を確認し、部分的な展開結果を作らない
    for value in template.values() {
        if let Some(d) = value.references().into_iter().find(|d| !d.is_resolved()) {
            return Err(StackError::UnresolvedReference(d.reference()));
        }
    }

    let mut resolved = ResolvedConfiguration::default();
    for (name, value) in template.iter() {
        let mut indirect = false;
        let text = render(value, &mut indirect)?;
        if indirect {
            resolved.indirect.push(name.to_string());
        }
        resolved.entries.insert(name.to_string(), text);
    }
    Ok(resolved)
}

fn render(value: &ConfigValue, indirect: &mut bool) -> Result<String> {
    Ok(match value {
        ConfigValue::Ref(d) if d.is_sensitive() => {
            *indirect = true;
            secret_indirection(d)
        }
        ConfigValue::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&render(part, indirect)?);
            }
            out
        }
        ConfigValue::List(_) | ConfigValue::Map(_) | ConfigValue::Template(_) => {
            to_text(&to_indirect_json(value, indirect)?)
        }
        other => to_text(&other.resolve()?),
    })
}

fn to_indirect_json(value: &ConfigValue, indirect: &mut bool) -> Result<Value> {
    Ok(match value {
        ConfigValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| to_indirect_json(item, indirect))
                .collect::<Result<Vec<_>>>()?,
        ),
        ConfigValue::Map(entries) => {
            let mut object = serde_json::Map::with_capacity(entries.len());
            for (key, item) in entries {
                object.insert(key.clone(), to_indirect_json(item, indirect)?);
            }
            Value::Object(object)
        }
        ConfigValue::Template(template) => {
            let nested = interpolate(template)?;
            if !nested.indirect.is_empty() {
                *indirect = true;
            }
            nested.to_json()
        }
        ConfigValue::Ref(_) | ConfigValue::Concat(_) => Value::String(render(value, indirect)?),
        literal => literal.resolve()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpolate_literals_and_references() {
        let host = Deferred::new("Database", "endpointAddress");
        let port = Deferred::new("Database", "endpointPort");
        host.resolve(json!("db.internal")).unwrap();
        port.resolve(json!(5432)).unwrap();

        let template = Template::new()
            .with("DB_HOST", &host)
            .with("DB_PORT", &port)
            .with("DB_NAME", "carboncycledb")
            .with(
                "DATABASE_URL",
                ConfigValue::concat([
                    ConfigValue::from("postgres://"),
                    ConfigValue::from(&host),
                    ConfigValue::from(":"),
                    ConfigValue::from(&port),
                ]),
            );

        let resolved = interpolate(&template).unwrap();
        assert_eq!(resolved.get("DB_HOST"), Some("db.internal"));
        assert_eq!(resolved.get("DB_PORT"), Some("5432"));
        assert_eq!(resolved.get("DB_NAME"), Some("carboncycledb"));
        assert_eq!(resolved.get("DATABASE_URL"), Some("postgres://db.internal:5432"));
        assert!(!resolved.is_indirect("DB_HOST"));
    }

    #[test]
    fn test_interpolate_fails_on_unresolved_reference() {
        let host = Deferred::new("Database", "endpointAddress");
        let template = Template::new().with("NAME", "x").with("DB_HOST", &host);

        match interpolate(&template) {
            Err(StackError::UnresolvedReference(r)) => assert_eq!(r, "Database.endpointAddress"),
            other => panic!("Expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn test_sensitive_values_use_indirection() {
        let password = Deferred::with_sensitivity("DbPassword", "value", true);
        password.resolve(json!("raw-password")).unwrap();

        let template = Template::new().with("DB_PASSWORD", &password);
        let resolved = template.interpolate().unwrap();

        assert_eq!(
            resolved.get("DB_PASSWORD"),
            Some("#{secret:DbPassword/value}")
        );
        assert!(resolved.is_indirect("DB_PASSWORD"));
        assert!(!resolved.to_string().contains("raw-password"));
        assert!(!resolved.to_json().to_string().contains("raw-password"));
    }

    #[test]
    fn test_sensitive_value_must_still_be_resolved() {
        let password = Deferred::with_sensitivity("Secret", "password", true);
        let template = Template::new().with("DB_PASSWORD", &password);
        assert!(matches!(
            template.interpolate(),
            Err(StackError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_env_lines_keep_declaration_order() {
        let template: Template = [("B", "2"), ("A", "1")].into_iter().collect();
        let resolved = template.interpolate().unwrap();
        assert_eq!(resolved.to_env_lines(), vec!["B=2", "A=1"]);
    }
}
