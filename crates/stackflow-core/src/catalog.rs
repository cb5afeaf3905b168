//! リソース種別カタログ
//!
//! 種別ごとに、プロビジョニング後に確定する出力属性を定義します。
//! 新しい種別は `register` で追加でき、グラフエンジンに手を入れる必要はありません。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// 出力属性の定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    /// レポートで常にマスクされ、テンプレートでは間接参照になる
    #[serde(default)]
    pub sensitive: bool,
}

/// リソース種別の定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSpec {
    pub name: String,
    pub outputs: Vec<OutputSpec>,
}

impl KindSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: Vec::new(),
        }
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec {
            name: name.into(),
            sensitive: false,
        });
        self
    }

    pub fn sensitive_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(OutputSpec {
            name: name.into(),
            sensitive: true,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// 種別名から定義へのマッピング
#[derive(Debug, Clone, Default)]
pub struct KindCatalog {
    kinds: IndexMap<String, KindSpec>,
}

impl KindCatalog {
    /// 空のカタログ
    pub fn new() -> Self {
        Self::default()
    }

    /// 標準の種別を登録済みのカタログ
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog.register(
            KindSpec::new("network")
                .output("vpcId")
                .output("privateSubnetIds")
                .output("publicSubnetIds"),
        );
        catalog.register(
            KindSpec::new("database")
                .output("endpointAddress")
                .output("endpointPort")
                .output("secretName")
                .sensitive_output("generatedCredential"),
        );
        catalog.register(
            KindSpec::new("secret")
                .output("arn")
                .sensitive_output("username")
                .sensitive_output("password"),
        );
        catalog.register(
            KindSpec::new("parameter")
                .output("parameterName")
                .sensitive_output("value"),
        );
        catalog.register(KindSpec::new("role").output("roleName").output("arn"));
        catalog.register(
            KindSpec::new("instance-profile")
                .output("instanceProfileName")
                .output("arn"),
        );
        catalog.register(KindSpec::new("artifact").output("bucket").output("key"));
        catalog.register(KindSpec::new("application").output("applicationName"));
        catalog.register(KindSpec::new("application-version").output("versionLabel"));
        catalog.register(
            KindSpec::new("environment")
                .output("environmentId")
                .output("endpointUrl"),
        );
        catalog
    }

    /// 種別を登録。同名の種別は置き換える
    pub fn register(&mut self, spec: KindSpec) {
        self.kinds.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, kind: &str) -> Option<&KindSpec> {
        self.kinds.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog() {
        let catalog = KindCatalog::standard();
        let database = catalog.get("database").unwrap();
        assert!(database.get("endpointAddress").is_some());
        assert!(database.get("endpointPort").is_some());
        assert!(database.get("generatedCredential").unwrap().sensitive);
        assert!(!database.get("endpointAddress").unwrap().sensitive);
        assert!(catalog.get("secret").unwrap().get("password").unwrap().sensitive);
        assert!(catalog.get("queue").is_none());
    }

    #[test]
    fn test_register_custom_kind() {
        let mut catalog = KindCatalog::standard();
        catalog.register(KindSpec::new("queue").output("queueUrl"));
        assert!(catalog.contains("queue"));
        assert_eq!(catalog.kinds().last(), Some("queue"));
    }
}
