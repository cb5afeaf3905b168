use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CARBON_CYCLE: &str = r#"
stack "carbon-cycle"

resource "CarbonCycleVPC" kind="network" {
    max-azs 2
}

resource "CarbonCycleDatabase" kind="database" {
    depends-on "CarbonCycleVPC"
    engine "postgres"
    vpc "${CarbonCycleVPC.vpcId}"
    credentials username="carboncycleuser"
}

resource "DBSecret" kind="secret" {
    secret-name "${CarbonCycleDatabase.secretName}"
}

resource "CarbonCycleEnvironment" kind="environment" {
    env {
        DB_HOST "${CarbonCycleDatabase.endpointAddress}"
        DB_PASSWORD "${DBSecret.password}"
    }
}

output "DatabaseEndpoint" "${CarbonCycleDatabase.endpointAddress}" description="The endpoint of the database"
output "EnvironmentUrl" "http://${CarbonCycleEnvironment.endpointUrl}"
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn with_stack(content: &str) -> Self {
        let project = Self::new();
        project.write_stack_kdl(content);
        project
    }

    pub fn write_stack_kdl(&self, content: &str) {
        fs::write(self.root.path().join("stack.kdl"), content).unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.path().join(".stackflow").join("state.json")
    }

    #[allow(dead_code)]
    pub fn read_state(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.state_path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }
}
