//! Kind-specific output fabrication

use indexmap::IndexMap;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::{Value, json};
use stackflow_cloud::{ProvisionError, ProvisionRequest};

const PASSWORD_LENGTH: usize = 24;
const DEFAULT_AZS: i64 = 2;

/// Random lowercase hex suffix for identifiers
pub(crate) fn suffix() -> String {
    format!("{:08x}", rand::rng().random::<u32>())
}

/// Random alphanumeric password
pub(crate) fn password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Look up a setting under any of its spellings (`max-azs`, `maxAzs`)
fn setting<'a>(request: &'a ProvisionRequest, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| request.config.get(*name))
}

fn setting_str<'a>(request: &'a ProvisionRequest, names: &[&str]) -> Option<&'a str> {
    setting(request, names).and_then(Value::as_str)
}

/// Secret name a `secret` resource points at (`secret-name`, `secretName`)
pub(crate) fn secret_name(request: &ProvisionRequest) -> Option<&str> {
    setting_str(request, &["secret-name", "secretName"])
}

/// Build the outputs a resource of `request.kind` would expose
///
/// `stored` is the credential already held under the requested secret name,
/// if the provider knows one.
pub(crate) fn fabricate(
    request: &ProvisionRequest,
    region: &str,
    stored: Option<&Value>,
) -> Result<IndexMap<String, Value>, ProvisionError> {
    let id = request.node_id.as_str();
    let slug = id.to_lowercase();
    let mut outputs = IndexMap::new();

    match request.kind.as_str() {
        "network" => {
            let azs = match setting(request, &["max-azs", "maxAzs"]) {
                None => DEFAULT_AZS,
                Some(v) => v.as_i64().filter(|n| *n > 0).ok_or_else(|| {
                    ProvisionError::InvalidConfig(format!(
                        "{}: max-azs must be a positive integer, got {}",
                        id, v
                    ))
                })?,
            };
            let subnets = |tier: &str| -> Vec<String> {
                (0..azs)
                    .map(|i| format!("subnet-{}-{}{}", tier, suffix(), i))
                    .collect()
            };
            outputs.insert("vpcId".to_string(), json!(format!("vpc-{}", suffix())));
            outputs.insert("privateSubnetIds".to_string(), json!(subnets("private")));
            outputs.insert("publicSubnetIds".to_string(), json!(subnets("public")));
        }
        "database" => {
            let engine = setting_str(request, &["engine"]).unwrap_or("postgres");
            let port = match setting(request, &["port"]).and_then(Value::as_i64) {
                Some(port) => port,
                None if engine.starts_with("mysql") || engine.starts_with("mariadb") => 3306,
                None => 5432,
            };
            let username = request
                .config
                .get("credentials")
                .and_then(|c| c.get("username"))
                .and_then(Value::as_str)
                .unwrap_or("admin");
            outputs.insert(
                "endpointAddress".to_string(),
                json!(format!("{}.{}.{}.db.local", slug, suffix(), region)),
            );
            outputs.insert("endpointPort".to_string(), json!(port));
            outputs.insert(
                "secretName".to_string(),
                json!(format!("{}-credentials", slug)),
            );
            outputs.insert(
                "generatedCredential".to_string(),
                json!({ "username": username, "password": password() }),
            );
        }
        "secret" => {
            // 名前で参照した既存の認証情報、または直接渡された認証情報を保管する
            let credential = stored.or_else(|| {
                setting(request, &["credential"]).filter(|c| c.is_object())
            });
            let username = credential
                .and_then(|c| c.get("username"))
                .and_then(Value::as_str)
                .or_else(|| setting_str(request, &["username"]))
                .unwrap_or("admin")
                .to_string();
            let secret = credential
                .and_then(|c| c.get("password"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(password);
            outputs.insert(
                "arn".to_string(),
                json!(format!(
                    "arn:local:secretsmanager:{}:secret:{}-{}",
                    region,
                    secret_name(request).unwrap_or(id),
                    suffix()
                )),
            );
            outputs.insert("username".to_string(), json!(username));
            outputs.insert("password".to_string(), json!(secret));
        }
        "parameter" => {
            let name = setting_str(request, &["name", "parameter-name", "parameterName"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("/{}", id));
            let value = setting(request, &["value"]).cloned().unwrap_or(json!(""));
            outputs.insert("parameterName".to_string(), json!(name));
            outputs.insert("value".to_string(), value);
        }
        "role" | "instance-profile" => {
            let name = setting_str(request, &["name"]).unwrap_or(id);
            let (name_key, arn_type) = if request.kind == "role" {
                ("roleName", "role")
            } else {
                ("instanceProfileName", "instance-profile")
            };
            outputs.insert(name_key.to_string(), json!(name));
            outputs.insert(
                "arn".to_string(),
                json!(format!("arn:local:iam::{}/{}", arn_type, name)),
            );
        }
        "artifact" => {
            let bucket = setting_str(request, &["bucket"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-{}", slug, suffix()));
            let key = setting_str(request, &["key", "path"])
                .and_then(|p| p.rsplit('/').next())
                .unwrap_or("bundle.zip");
            outputs.insert("bucket".to_string(), json!(bucket));
            outputs.insert("key".to_string(), json!(key));
        }
        "application" => {
            let name = setting_str(request, &["name", "application-name", "applicationName"])
                .unwrap_or(id);
            outputs.insert("applicationName".to_string(), json!(name));
        }
        "application-version" => {
            let label = setting_str(request, &["label", "version-label", "versionLabel"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("v-{}", suffix()));
            outputs.insert("versionLabel".to_string(), json!(label));
        }
        "environment" => {
            outputs.insert(
                "environmentId".to_string(),
                json!(format!("e-{}", suffix())),
            );
            outputs.insert(
                "endpointUrl".to_string(),
                json!(format!("{}.{}.local", slug, region)),
            );
        }
        other => {
            tracing::debug!(kind = %other, "No fabrication rules for kind; using generic outputs");
        }
    }

    // 宣言された出力は必ず返す
    for attribute in &request.expected_outputs {
        if !outputs.contains_key(attribute) {
            outputs.insert(attribute.clone(), json!(format!("{}-{}", id, attribute)));
        }
    }

    Ok(outputs)
}
