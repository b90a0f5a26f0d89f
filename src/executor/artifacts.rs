//! Deployment artifact rendering
//!
//! Turns an [`Artifact`] into the files a node needs to build and run the
//! application: a Dockerfile for the selected language, a compose file for
//! the app + database pair, the `wait-for-it.sh` start gate and, for python,
//! a database bootstrap script.
//!
//! Rendering is a pure function of its input. Re-running `configure` with the
//! same artifact must produce byte-identical files.

use crate::executor::error::ArtifactError;
use crate::topology::model::{AfterCommand, Artifact, BeforeCommand, CodeCheckout};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

pub const DOCKERFILE: &str = "Dockerfile";
pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const WAIT_FOR_IT: &str = "wait-for-it.sh";
pub const INIT_SQL: &str = "init.sql";

/// Every file name `generate` may produce
pub const ALL_ARTIFACT_FILES: [&str; 4] = [DOCKERFILE, COMPOSE_FILE, WAIT_FOR_IT, INIT_SQL];

/// Supported application runtimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Java,
    Python,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Python => "python",
        }
    }

    /// Where the builder stage checks the code out
    fn source_dir(self) -> &'static str {
        match self {
            Language::Java => "/app",
            Language::Python => "/app_builder",
        }
    }
}

impl FromStr for Language {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "java" => Ok(Language::Java),
            "python" => Ok(Language::Python),
            other => Err(ArtifactError::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rendered file, relative to the node's working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub file_name: &'static str,
    pub contents: String,
}

/// Render every artifact for `artifact`, in a fixed order.
pub fn generate(artifact: &Artifact) -> Result<Vec<GeneratedArtifact>, ArtifactError> {
    let language: Language = artifact.application.language.parse()?;

    let dockerfile = match language {
        Language::Java => java_dockerfile(artifact)?,
        Language::Python => python_dockerfile(artifact),
    };

    let mut files = vec![
        GeneratedArtifact {
            file_name: DOCKERFILE,
            contents: dockerfile,
        },
        GeneratedArtifact {
            file_name: COMPOSE_FILE,
            contents: compose_file(artifact, language),
        },
        GeneratedArtifact {
            file_name: WAIT_FOR_IT,
            contents: wait_for_it_script(),
        },
    ];

    if language == Language::Python {
        files.push(GeneratedArtifact {
            file_name: INIT_SQL,
            contents: init_sql(&artifact.database.name),
        });
    }

    Ok(files)
}

fn build_command(builder: &str) -> Result<&'static str, ArtifactError> {
    match builder {
        "maven" => Ok("mvn install -DskipTests"),
        "gradle" => Ok("gradle build -x test"),
        other => Err(ArtifactError::UnsupportedBuilder(other.to_string())),
    }
}

fn checkout_steps(checkout: &CodeCheckout, language: Language) -> String {
    let mut steps = String::new();
    let dest = language.source_dir();

    if checkout.git.enabled {
        let git = &checkout.git;
        let _ = writeln!(steps, "ARG GIT_USERNAME={}", git.repo_user);
        let _ = writeln!(steps, "ARG GIT_PASSWORD={}", git.repo_password);
        steps.push_str(
            "RUN git config --global credential.helper '!f() { echo \"username=${GIT_USERNAME}\"; echo \"password=${GIT_PASSWORD}\"; }; f'\n",
        );
        let _ = writeln!(
            steps,
            "RUN git clone https://${{GIT_USERNAME}}:${{GIT_PASSWORD}}@{} {} || (echo \"Git clone failed\"; exit 1)",
            git.repo_url, dest
        );
    }

    if checkout.scp.enabled {
        let _ = writeln!(steps, "COPY {} {}", checkout.scp.configurations.folder, dest);
    }

    steps
}

fn before_steps(commands: &[BeforeCommand]) -> String {
    let mut sorted: Vec<&BeforeCommand> = commands.iter().collect();
    sorted.sort_by_key(|c| c.priority);
    sorted.iter().map(|c| format!("RUN {}\n", c.command)).collect()
}

fn after_steps(commands: &[AfterCommand]) -> String {
    let mut sorted: Vec<&AfterCommand> = commands.iter().collect();
    sorted.sort_by_key(|c| c.run_order);
    sorted.iter().map(|c| format!("RUN {}\n", c.command)).collect()
}

fn java_dockerfile(artifact: &Artifact) -> Result<String, ArtifactError> {
    let app = &artifact.application;
    let build = build_command(&app.builder.name)?;
    let commands = &artifact.extra_commands.commands;

    Ok(format!(
        r#"FROM {builder_image} AS builder

RUN apt-get update && apt-get install -y git

WORKDIR /app

# Code checkout
{checkout}
# Extra commands before build
{before}
RUN {build}

# Extra commands after build
{after}
FROM {image}

WORKDIR /app

COPY {wait_for_it} /wait-for-it.sh
RUN chmod +x /wait-for-it.sh

COPY --from=builder {target} app.jar

EXPOSE {app_port}

CMD ["/wait-for-it.sh", "database", "{db_port}", "--", "java", "-jar", "app.jar"]
"#,
        builder_image = app.builder.docker_image,
        checkout = checkout_steps(&artifact.code_checkout, Language::Java),
        before = before_steps(&commands.before),
        build = build,
        after = after_steps(&commands.after),
        image = app.docker_image,
        wait_for_it = WAIT_FOR_IT,
        target = app.artifact.target,
        app_port = app.ports.internal_docker,
        db_port = artifact.database.ports.internal_docker,
    ))
}

fn python_dockerfile(artifact: &Artifact) -> String {
    let app = &artifact.application;
    let commands = &artifact.extra_commands.commands;

    format!(
        r#"FROM {image} AS builder

ENV PYTHONDONTWRITEBYTECODE=1
ENV PYTHONUNBUFFERED=1

RUN apt-get update \
    && apt-get install -y --no-install-recommends git pkg-config libmariadb-dev-compat build-essential \
    && rm -rf /var/lib/apt/lists/*

WORKDIR /app_builder

# Code checkout
{checkout}
# Extra commands before build
{before}
RUN python -m venv venv
ENV PATH="/app_builder/venv/bin:$PATH"
RUN pip install --upgrade pip && pip install -r /app_builder/requirements.txt

# Extra commands after build
{after}
FROM {image}

ENV PYTHONDONTWRITEBYTECODE=1
ENV PYTHONUNBUFFERED=1

WORKDIR /app

COPY --from=builder /app_builder /app

COPY {wait_for_it} /wait-for-it.sh
RUN chmod +x /wait-for-it.sh

EXPOSE {app_port}

CMD ["/wait-for-it.sh", "database", "{db_port}", "--", "sh", "-c", "/app/venv/bin/python manage.py makemigrations && /app/venv/bin/python manage.py migrate && /app/venv/bin/python manage.py runserver 0.0.0.0:{app_port}"]
"#,
        image = app.docker_image,
        checkout = checkout_steps(&artifact.code_checkout, Language::Python),
        before = before_steps(&commands.before),
        after = after_steps(&commands.after),
        wait_for_it = WAIT_FOR_IT,
        app_port = app.ports.internal_docker,
        db_port = artifact.database.ports.internal_docker,
    )
}

fn compose_file(artifact: &Artifact, language: Language) -> String {
    let app = &artifact.application;
    let db = &artifact.database;

    let mut environment = String::new();
    let _ = writeln!(environment, "      MYSQL_ROOT_PASSWORD: {}", yaml_quote(&db.root_password));
    let _ = writeln!(environment, "      MYSQL_DATABASE: {}", yaml_quote(&db.name));
    if !db.user.is_empty() && db.user != "root" {
        let _ = writeln!(environment, "      MYSQL_USER: {}", yaml_quote(&db.user));
        let _ = writeln!(environment, "      MYSQL_PASSWORD: {}", yaml_quote(&db.password));
    }
    environment.push_str("      MYSQL_ALLOW_EMPTY_PASSWORD: 'yes'\n");

    let volumes = match language {
        Language::Python => format!(
            "    volumes:\n      - ./{}:/docker-entrypoint-initdb.d/init.sql\n",
            INIT_SQL
        ),
        Language::Java => String::new(),
    };

    format!(
        r#"services:
  app:
    container_name: app
    build:
      context: .
      dockerfile: {dockerfile}
    ports:
      - "{app_external}:{app_internal}"
    depends_on:
      - database

  database:
    container_name: database
    image: {db_image}
    environment:
{environment}    ports:
      - "{db_external}:{db_internal}"
    command: ["mysqld", "--character-set-server=utf8mb4", "--collation-server=utf8mb4_unicode_ci", "--bind-address=0.0.0.0"]
{volumes}"#,
        dockerfile = DOCKERFILE,
        app_external = app.ports.external_docker,
        app_internal = app.ports.internal_docker,
        db_image = db.driver,
        environment = environment,
        db_external = db.ports.external_docker,
        db_internal = db.ports.internal_docker,
        volumes = volumes,
    )
}

fn yaml_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn init_sql(database: &str) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;\n",
        database.replace('`', "``")
    )
}

fn wait_for_it_script() -> String {
    r#"#!/bin/bash
# usage: wait-for-it.sh HOST PORT -- COMMAND [ARGS...]
set -e

host="$1"
port="$2"
shift 2
if [ "$1" = "--" ]; then
  shift
fi

for attempt in $(seq 1 60); do
  if (echo > "/dev/tcp/$host/$port") >/dev/null 2>&1; then
    echo "$host:$port is available after $attempt attempt(s)"
    exec "$@"
  fi
  echo "waiting for $host:$port ($attempt/60)"
  sleep 2
done

echo "timed out waiting for $host:$port" >&2
exit 1
"#
    .to_string()
}
