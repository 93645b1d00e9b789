//! Infrastructure and environment pattern detection
//!
//! Findings are per file and become relevance tags on every node the file
//! contributes. Matching is textual and case-insensitive.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sapling_core::InfraFindings;

static DATABASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(postgres(?:ql)?|mysql|mariadb|sqlite3?|mongo(?:db)?|redis|cassandra|dynamodb|elasticsearch|sqlalchemy|psycopg2?|pymongo|sequelize|prisma|typeorm|mongoose|knex)\b",
    )
    .expect("database pattern is valid")
});
static API: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(fastapi|flask|django|express|koa|graphql|grpc|openapi|swagger|requests|axios|fetch|httpx|aiohttp|app\.route|router\.(?:get|post|put|delete))\b",
    )
    .expect("api pattern is valid")
});
static MESSAGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(kafka|rabbitmq|amqp|celery|nats|pubsub|sqs|sns|kinesis|mqtt|zeromq|bullmq)\b")
        .expect("messaging pattern is valid")
});
static CLOUD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(aws|boto3|s3|azure|gcp|google\.cloud|cloudformation|cloudflare|vercel|heroku)\b")
        .expect("cloud pattern is valid")
});
static DEVOPS_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(kubectl|helm|terraform|ansible|docker\s+(?:build|run|push))\b")
        .expect("devops pattern is valid")
});
/// `scheme://...` connection strings, captured whole.
static CONNECTION_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b[a-z][a-z0-9+.\-]*://[^\s'"`<>]+"#).expect("connection string pattern is valid")
});
static ENV_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[a-z]+").expect("environment token pattern is valid"));

const DEVOPS_FILE_NAMES: &[&str] = &[
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
    "Jenkinsfile",
    ".gitlab-ci.yml",
    "Chart.yaml",
];

fn environment(token: &str) -> Option<&'static str> {
    match token.to_ascii_lowercase().as_str() {
        "dev" | "development" => Some("development"),
        "stage" | "staging" => Some("staging"),
        "prod" | "production" => Some("production"),
        "test" => Some("test"),
        _ => None,
    }
}

fn is_devops_path(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if DEVOPS_FILE_NAMES.contains(&name) || name.starts_with("Dockerfile.") {
        return true;
    }
    if path.extension().is_some_and(|e| e == "tf" || e == "tfvars") {
        return true;
    }
    let normalized = path.to_string_lossy().replace('\\', "/");
    normalized.contains(".github/workflows/") || normalized.contains(".circleci/")
}

/// Scan one file's path and content.
pub fn detect(path: &Path, content: &str) -> InfraFindings {
    let mut findings = InfraFindings {
        database: DATABASE.is_match(content),
        api: API.is_match(content),
        messaging: MESSAGING.is_match(content),
        cloud: CLOUD.is_match(content),
        devops: is_devops_path(path) || DEVOPS_CONTENT.is_match(content),
        ..InfraFindings::default()
    };

    for url in CONNECTION_STRING.find_iter(content) {
        for token in ENV_TOKEN.find_iter(url.as_str()) {
            if let Some(env) = environment(token.as_str()) {
                findings.environments.insert(env.to_string());
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_code_has_no_findings() {
        let findings = detect(Path::new("util.py"), "def add(a, b):\n    return a + b\n");
        assert!(findings.is_empty());
    }

    #[test]
    fn test_categories() {
        let code = r#"
import boto3
from kafka import KafkaProducer
from sqlalchemy import create_engine
from fastapi import FastAPI
"#;
        let findings = detect(Path::new("service.py"), code);
        assert!(findings.database);
        assert!(findings.api);
        assert!(findings.messaging);
        assert!(findings.cloud);
        assert!(!findings.devops);
    }

    #[test]
    fn test_lambda_keyword_is_not_cloud() {
        let findings = detect(Path::new("sort.py"), "items.sort(key=lambda x: x[1])\n");
        assert!(!findings.cloud);
    }

    #[test]
    fn test_devops_by_path_and_content() {
        assert!(detect(Path::new("Dockerfile"), "FROM alpine\n").devops);
        assert!(detect(Path::new("infra/main.tf"), "").devops);
        assert!(detect(Path::new(".github/workflows/ci.yml"), "on: push\n").devops);
        assert!(detect(Path::new("deploy.sh"), "kubectl apply -f app.yaml\n").devops);
        assert!(!detect(Path::new("app.js"), "console.log(1)\n").devops);
    }

    #[test]
    fn test_environments_from_connection_strings() {
        let code = r#"
PRIMARY = "postgresql://app@db.prod.internal:5432/orders"
REPLICA = "redis://cache-staging:6379/0"
LOCAL = "mongodb://localhost/dev_db"
"#;
        let findings = detect(Path::new("settings.py"), code);
        let envs: Vec<&str> = findings.environments.iter().map(String::as_str).collect();
        assert_eq!(envs, vec!["development", "production", "staging"]);
    }

    #[test]
    fn test_environment_words_outside_urls_ignored() {
        let findings = detect(Path::new("notes.py"), "# run the test suite before prod deploys\n");
        assert!(findings.environments.is_empty());
    }
}
