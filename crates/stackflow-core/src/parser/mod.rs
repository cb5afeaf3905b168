//! KDLパーサー
//!
//! スタック定義ファイル (`stack.kdl`) を読み込み、`StackBuilder` への宣言に
//! 変換します。文字列中の `${Node.attribute}` は遅延値参照になります。
//!
//! ```kdl
//! stack "carbon-cycle"
//!
//! resource "Vpc" kind="network" {
//!     max-azs 2
//! }
//!
//! resource "Database" kind="database" {
//!     depends-on "Vpc"
//!     vpc "${Vpc.vpcId}"
//! }
//!
//! dependency "Environment" on="AppVersion"
//! output "DatabaseEndpoint" "${Database.endpointAddress}" description="..."
//! ```

use crate::catalog::KindCatalog;
use crate::error::{Result, StackError};
use crate::stack::{Stack, StackBuilder};
use crate::template::Template;
use crate::value::ConfigValue;
use indexmap::IndexMap;
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// `${Node.attribute}` 形式の参照
const REFERENCE_PATTERN: &str = r"\$\{([A-Za-z0-9_\-]+)\.([A-Za-z0-9_\-]+)\}";

/// 子ブロックをテンプレートとして扱う設定キー
const TEMPLATE_KEY: &str = "env";

/// KDLファイルをパースしてStackを生成
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_stack_str(&content, name)
}

/// KDL文字列をパース
pub fn parse_stack_str(content: &str, default_name: String) -> Result<Stack> {
    parse_stack_str_with_catalog(content, default_name, KindCatalog::standard())
}

/// 種別カタログを指定してKDL文字列をパース
pub fn parse_stack_str_with_catalog(
    content: &str,
    default_name: String,
    catalog: KindCatalog,
) -> Result<Stack> {
    let doc: KdlDocument = content.parse()?;

    let name = doc
        .nodes()
        .iter()
        .find(|n| n.name().value() == "stack")
        .and_then(|n| first_string(n))
        .unwrap_or(default_name);

    let mut parser = DefinitionParser {
        builder: StackBuilder::with_catalog(name, catalog),
        reference: Regex::new(REFERENCE_PATTERN)
            .map_err(|e| StackError::InvalidDefinition(format!("正規表現のコンパイルエラー: {}", e)))?,
    };

    // 依存と出力は全リソースの宣言後に処理する (前方参照を許可)
    let mut dependencies: Vec<&KdlNode> = Vec::new();
    let mut outputs: Vec<&KdlNode> = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {}
            "resource" => parser.declare_resource(node)?,
            "dependency" => dependencies.push(node),
            "output" => outputs.push(node),
            other => {
                return Err(StackError::InvalidDefinition(format!(
                    "不明なトップレベルノード: {}",
                    other
                )));
            }
        }
    }

    for node in dependencies {
        parser.add_dependency(node)?;
    }
    for node in outputs {
        parser.declare_output(node)?;
    }

    parser.builder.build()
}

struct DefinitionParser {
    builder: StackBuilder,
    reference: Regex,
}

impl DefinitionParser {
    /// resource ノードを宣言
    fn declare_resource(&mut self, node: &KdlNode) -> Result<()> {
        let id = first_string(node).ok_or_else(|| {
            StackError::InvalidDefinition("resource にはIDが必要です".to_string())
        })?;
        let kind = property(node, "kind")
            .and_then(KdlValue::as_string)
            .ok_or_else(|| {
                StackError::InvalidDefinition(format!("resource '{}' には kind=\"...\" が必要です", id))
            })?
            .to_string();

        let mut depends_on: Vec<String> = Vec::new();
        let mut config: IndexMap<String, ConfigValue> = IndexMap::new();

        if let Some(children) = node.children() {
            for child in children.nodes() {
                match child.name().value() {
                    "depends-on" | "depends_on" => {
                        for entry in arguments(child) {
                            let dep = entry.value().as_string().ok_or_else(|| {
                                StackError::InvalidDefinition(format!(
                                    "resource '{}': depends-on には文字列を指定してください",
                                    id
                                ))
                            })?;
                            depends_on.push(dep.to_string());
                        }
                    }
                    key => {
                        let value = self.parse_setting(child)?;
                        config.insert(key.to_string(), value);
                    }
                }
            }
        }

        let deps: Vec<&str> = depends_on.iter().map(String::as_str).collect();
        self.builder
            .declare(&id, &kind, ConfigValue::Map(config), &deps)?;
        debug!(resource = %id, kind = %kind, "Parsed resource");
        Ok(())
    }

    /// dependency "A" on="B"
    fn add_dependency(&mut self, node: &KdlNode) -> Result<()> {
        let dependent = first_string(node).ok_or_else(|| {
            StackError::InvalidDefinition("dependency にはリソースIDが必要です".to_string())
        })?;
        let dependency = property(node, "on")
            .and_then(KdlValue::as_string)
            .ok_or_else(|| {
                StackError::InvalidDefinition(format!(
                    "dependency '{}' には on=\"...\" が必要です",
                    dependent
                ))
            })?;
        self.builder.add_dependency(&dependent, dependency)
    }

    /// output "Name" "value" description="..."
    fn declare_output(&mut self, node: &KdlNode) -> Result<()> {
        let args: Vec<&KdlEntry> = arguments(node).collect();
        let (name, value) = match args.as_slice() {
            [name, value] => (name.value(), value.value()),
            _ => {
                return Err(StackError::InvalidDefinition(
                    "output には名前と値が必要です".to_string(),
                ));
            }
        };
        let name = name.as_string().ok_or_else(|| {
            StackError::InvalidDefinition("output の名前は文字列で指定してください".to_string())
        })?;
        let description = property(node, "description")
            .and_then(KdlValue::as_string)
            .map(str::to_string);
        let value = self.parse_value(value)?;
        self.builder.output(name, value, description)
    }

    /// 設定ノードを値に変換
    fn parse_setting(&self, node: &KdlNode) -> Result<ConfigValue> {
        let key = node.name().value();
        let args: Vec<&KdlEntry> = arguments(node).collect();
        let props: Vec<&KdlEntry> = node.entries().iter().filter(|e| e.name().is_some()).collect();

        if let Some(children) = node.children() {
            if !args.is_empty() || !props.is_empty() {
                return Err(StackError::InvalidDefinition(format!(
                    "'{}': ブロック形式の設定に引数は指定できません",
                    key
                )));
            }
            if key == TEMPLATE_KEY {
                let mut template = Template::new();
                for child in children.nodes() {
                    template.insert(child.name().value(), self.parse_setting(child)?);
                }
                return Ok(ConfigValue::Template(template));
            }
            let mut map = IndexMap::new();
            for child in children.nodes() {
                map.insert(child.name().value().to_string(), self.parse_setting(child)?);
            }
            return Ok(ConfigValue::Map(map));
        }

        match (args.as_slice(), props.is_empty()) {
            // 引数なしはフラグ扱い
            ([], true) => Ok(ConfigValue::Bool(true)),
            ([], false) => {
                let mut map = IndexMap::new();
                for prop in props {
                    if let Some(name) = prop.name() {
                        map.insert(name.value().to_string(), self.parse_value(prop.value())?);
                    }
                }
                Ok(ConfigValue::Map(map))
            }
            ([single], true) => self.parse_value(single.value()),
            (many, true) => Ok(ConfigValue::List(
                many.iter()
                    .map(|e| self.parse_value(e.value()))
                    .collect::<Result<Vec<_>>>()?,
            )),
            (_, false) => Err(StackError::InvalidDefinition(format!(
                "'{}': 引数とプロパティは混在できません",
                key
            ))),
        }
    }

    fn parse_value(&self, value: &KdlValue) -> Result<ConfigValue> {
        if let Some(s) = value.as_string() {
            return self.parse_string(s);
        }
        if let Some(i) = value.as_integer() {
            let i = i64::try_from(i).map_err(|_| {
                StackError::InvalidDefinition(format!("整数が範囲外です: {}", i))
            })?;
            return Ok(ConfigValue::Integer(i));
        }
        if let Some(f) = value.as_float() {
            return Ok(ConfigValue::Float(f));
        }
        if let Some(b) = value.as_bool() {
            return Ok(ConfigValue::Bool(b));
        }
        Ok(ConfigValue::Null)
    }

    /// 文字列中の `${Node.attribute}` を参照に変換
    fn parse_string(&self, s: &str) -> Result<ConfigValue> {
        let mut parts: Vec<ConfigValue> = Vec::new();
        let mut last = 0;
        for caps in self.reference.captures_iter(s) {
            let (Some(whole), Some(node), Some(attribute)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            if whole.start() > last {
                parts.push(ConfigValue::String(s[last..whole.start()].to_string()));
            }
            let deferred = self.builder.reference(node.as_str(), attribute.as_str())?;
            parts.push(ConfigValue::Ref(deferred));
            last = whole.end();
        }

        if parts.is_empty() {
            return Ok(ConfigValue::String(s.to_string()));
        }
        if last < s.len() {
            parts.push(ConfigValue::String(s[last..].to_string()));
        }
        if parts.len() == 1 {
            return Ok(parts.remove(0));
        }
        Ok(ConfigValue::Concat(parts))
    }
}

fn arguments(node: &KdlNode) -> impl Iterator<Item = &KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none())
}

fn property<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == name))
        .map(KdlEntry::value)
}

fn first_string(node: &KdlNode) -> Option<String> {
    arguments(node)
        .next()
        .and_then(|e| e.value().as_string())
        .map(str::to_string)
}
