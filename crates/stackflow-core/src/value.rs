//! 設定値ツリー
//!
//! リソース設定は型付きのツリーとして表現します。遅延値への参照 (`Ref`) は
//! ツリーのどこにでも埋め込めるため、依存関係の推論はツリー全体を構造的に
//! 走査して行います。リソース種別ごとの個別処理は持ちません。

use crate::deferred::Deferred;
use crate::error::{Result, StackError};
use crate::report::MASK;
use crate::template::{Template, secret_indirection};
use indexmap::IndexMap;
use serde_json::Value;

/// リソース設定の値
#[derive(Debug, Clone)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(IndexMap<String, ConfigValue>),
    /// 他ノードの遅延値への参照
    Ref(Deferred),
    /// 文字列連結 (`"http://${Env.endpointUrl}"` など)
    Concat(Vec<ConfigValue>),
    /// 環境変数などのテンプレート。機密値は間接参照として展開される
    Template(Template),
}

impl ConfigValue {
    /// 空のマップ
    pub fn empty() -> Self {
        ConfigValue::Map(IndexMap::new())
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        ConfigValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<ConfigValue>>(items: impl IntoIterator<Item = V>) -> Self {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }

    pub fn concat<V: Into<ConfigValue>>(parts: impl IntoIterator<Item = V>) -> Self {
        ConfigValue::Concat(parts.into_iter().map(Into::into).collect())
    }

    /// マップのキーを参照
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        match self {
            ConfigValue::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// ツリーの全ノードを深さ優先で訪問
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a ConfigValue)) {
        visit(self);
        match self {
            ConfigValue::List(items) | ConfigValue::Concat(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            ConfigValue::Map(entries) => {
                for value in entries.values() {
                    value.walk(visit);
                }
            }
            ConfigValue::Template(template) => {
                for value in template.values() {
                    value.walk(visit);
                }
            }
            _ => {}
        }
    }

    /// 埋め込まれた全ての遅延値参照
    pub fn references(&self) -> Vec<&Deferred> {
        let mut refs = Vec::new();
        self.walk(&mut |value| {
            if let ConfigValue::Ref(d) = value {
                refs.push(d);
            }
        });
        refs
    }

    /// 機密属性への参照を含むか
    pub fn touches_sensitive(&self) -> bool {
        self.references().iter().any(|d| d.is_sensitive())
    }

    /// 全ての参照が確定しているか
    pub fn is_resolved(&self) -> bool {
        self.references().iter().all(|d| d.is_resolved())
    }

    /// 参照を具体値に置き換えた JSON を生成
    ///
    /// 機密属性への参照は値を埋め込まず、ツリーのどこにあっても
    /// `#{secret:<node>/<attribute>}` の間接参照として出力されます。
    /// 間接参照であっても参照先は確定している必要があります。
    pub fn resolve(&self) -> Result<Value> {
        Ok(match self {
            ConfigValue::Null => Value::Null,
            ConfigValue::Bool(b) => Value::Bool(*b),
            ConfigValue::Integer(i) => Value::from(*i),
            ConfigValue::Float(f) => Value::from(*f),
            ConfigValue::String(s) => Value::String(s.clone()),
            ConfigValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(ConfigValue::resolve)
                    .collect::<Result<Vec<_>>>()?,
            ),
            ConfigValue::Map(entries) => {
                let mut object = serde_json::Map::with_capacity(entries.len());
                for (key, value) in entries {
                    object.insert(key.clone(), value.resolve()?);
                }
                Value::Object(object)
            }
            ConfigValue::Ref(d) => {
                let value = read_reference(d)?;
                if d.is_sensitive() {
                    Value::String(secret_indirection(d))
                } else {
                    value.clone()
                }
            }
            ConfigValue::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&to_text(&part.resolve()?));
                }
                Value::String(out)
            }
            ConfigValue::Template(template) => template.interpolate()?.to_json(),
        })
    }

    /// 診断用の表示。機密値はマスクし、未確定の参照は `${node.attr}` で示す
    pub fn redacted(&self) -> Value {
        match self {
            ConfigValue::List(items) => {
                Value::Array(items.iter().map(ConfigValue::redacted).collect())
            }
            ConfigValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.redacted()))
                    .collect(),
            ),
            ConfigValue::Ref(d) => redact_reference(d),
            ConfigValue::Concat(parts) => Value::String(
                parts
                    .iter()
                    .map(|part| to_text(&part.redacted()))
                    .collect::<String>(),
            ),
            ConfigValue::Template(template) => Value::Object(
                template
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.redacted()))
                    .collect(),
            ),
            // 参照を含まないリテラルはそのまま
            literal => literal.resolve().unwrap_or(Value::Null),
        }
    }
}

fn read_reference(d: &Deferred) -> Result<&Value> {
    d.read()
        .map_err(|_| StackError::UnresolvedReference(d.reference()))
}

fn redact_reference(d: &Deferred) -> Value {
    if d.is_sensitive() {
        return Value::String(MASK.to_string());
    }
    match d.read() {
        Ok(v) => v.clone(),
        Err(_) => Value::String(d.to_string()),
    }
}

/// JSON値を文字列連結用のテキストに変換
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl Default for ConfigValue {
    fn default() -> Self {
        ConfigValue::empty()
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<i32> for ConfigValue {
    fn from(i: i32) -> Self {
        ConfigValue::Integer(i64::from(i))
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<Deferred> for ConfigValue {
    fn from(d: Deferred) -> Self {
        ConfigValue::Ref(d)
    }
}

impl From<&Deferred> for ConfigValue {
    fn from(d: &Deferred) -> Self {
        ConfigValue::Ref(d.clone())
    }
}

impl From<Template> for ConfigValue {
    fn from(t: Template) -> Self {
        ConfigValue::Template(t)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(items: Vec<ConfigValue>) -> Self {
        ConfigValue::List(items)
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ConfigValue::Null,
            Value::Bool(b) => ConfigValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Integer(i),
                None => ConfigValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => ConfigValue::String(s),
            Value::Array(items) => ConfigValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => {
                ConfigValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (Deferred, Deferred, ConfigValue) {
        let address = Deferred::new("Database", "endpointAddress");
        let password = Deferred::with_sensitivity("Secret", "password", true);
        let config = ConfigValue::map([
            ("name", ConfigValue::from("app")),
            (
                "nested",
                ConfigValue::map([(
                    "hosts",
                    ConfigValue::list([ConfigValue::from(&address), ConfigValue::from("fallback")]),
                )]),
            ),
            (
                "dsn",
                ConfigValue::concat([
                    ConfigValue::from("postgres://app:"),
                    ConfigValue::from(&password),
                    ConfigValue::from("@"),
                    ConfigValue::from(&address),
                ]),
            ),
        ]);
        (address, password, config)
    }

    #[test]
    fn test_references_walks_nested_values() {
        let (_, _, config) = sample();
        let refs: Vec<String> = config.references().iter().map(|d| d.reference()).collect();
        assert_eq!(
            refs,
            vec![
                "Database.endpointAddress",
                "Secret.password",
                "Database.endpointAddress"
            ]
        );
        assert!(config.touches_sensitive());
    }

    #[test]
    fn test_references_inside_template() {
        let port = Deferred::new("Database", "endpointPort");
        let mut template = Template::new();
        template.insert("DB_PORT", &port);
        let config = ConfigValue::map([("env", ConfigValue::from(template))]);

        let refs = config.references();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].same_cell(&port));
    }

    #[test]
    fn test_resolve_unresolved_reference_fails() {
        let (_, _, config) = sample();
        match config.resolve() {
            Err(StackError::UnresolvedReference(r)) => assert_eq!(r, "Database.endpointAddress"),
            other => panic!("Expected UnresolvedReference, got {:?}", other),
        }
        assert!(!config.is_resolved());
    }

    #[test]
    fn test_resolve_substitutes_values() {
        let (address, password, config) = sample();
        address.resolve(json!("db.local")).unwrap();
        password.resolve(json!("s3cret")).unwrap();

        let resolved = config.resolve().unwrap();
        assert_eq!(
            resolved,
            json!({
                "name": "app",
                "nested": { "hosts": ["db.local", "fallback"] },
                "dsn": "postgres://app:#{secret:Secret/password}@db.local"
            })
        );
    }

    #[test]
    fn test_resolve_never_embeds_sensitive_values() {
        let password = Deferred::with_sensitivity("Secret", "password", true);
        password.resolve(json!("s3cret")).unwrap();
        let config = ConfigValue::map([
            ("db-password", ConfigValue::from(&password)),
            ("replicas", ConfigValue::list([ConfigValue::from(&password)])),
        ]);

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved["db-password"], json!("#{secret:Secret/password}"));
        assert_eq!(resolved["replicas"][0], json!("#{secret:Secret/password}"));
        assert!(!resolved.to_string().contains("s3cret"));
    }

    #[test]
    fn test_resolve_sensitive_reference_must_be_resolved() {
        let password = Deferred::with_sensitivity("Secret", "password", true);
        let config = ConfigValue::map([("db-password", ConfigValue::from(&password))]);
        assert!(matches!(
            config.resolve(),
            Err(StackError::UnresolvedReference(r)) if r == "Secret.password"
        ));
    }

    #[test]
    fn test_redacted_masks_sensitive_values() {
        let (address, password, config) = sample();
        password.resolve(json!("s3cret")).unwrap();

        let redacted = config.redacted();
        assert_eq!(redacted["dsn"], json!("postgres://app:********@${Database.endpointAddress}"));

        address.resolve(json!("db.local")).unwrap();
        let redacted = config.redacted();
        assert_eq!(redacted["nested"]["hosts"][0], json!("db.local"));
        assert!(!redacted.to_string().contains("s3cret"));
    }

    #[test]
    fn test_from_json() {
        let value = ConfigValue::from(json!({"port": 5432, "ratio": 0.5, "tags": ["a"]}));
        assert!(matches!(value.get("port"), Some(ConfigValue::Integer(5432))));
        assert!(matches!(value.get("ratio"), Some(ConfigValue::Float(_))));
        assert!(matches!(value.get("tags"), Some(ConfigValue::List(items)) if items.len() == 1));
    }
}
