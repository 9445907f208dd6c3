//! Database engine launched through a container CLI.
//!
//! The engine runs `<cli> run -d -P <image>`, asks `<cli> port` which host
//! port was published for the engine's container port, and removes the
//! container with `<cli> rm -f` on teardown. Any Docker-compatible CLI works.
//!
//! A published port accepts connections as soon as the container starts, so
//! readiness is decided by the engine's own check run through `<cli> exec`
//! (`pg_isready` for PostgreSQL) before the host port is tried.

use std::ffi::OsString;
use std::net::{SocketAddr, TcpStream};
use std::process::{Command, Output};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ConnectionDescriptor, DatabaseEngine, DatabaseInstance};
use crate::config::DatabaseImage;
use crate::error::FixtureError;

const DEFAULT_CLI: &str = "docker";
const LOOPBACK: &str = "127.0.0.1";
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const POSTGRES_PORT: u16 = 5432;
const POSTGRES_USER: &str = "scenic";
const POSTGRES_PASSWORD: &str = "scenic";
const POSTGRES_DB: &str = "scenic";

/// Provisions database containers.
#[derive(Debug, Clone)]
pub struct ContainerEngine {
    cli: OsString,
    image: DatabaseImage,
    container_port: u16,
    env: Vec<(String, String)>,
    database: String,
    user: String,
    password: String,
    readiness_check: Vec<String>,
}

impl ContainerEngine {
    /// PostgreSQL with fixed test credentials.
    #[must_use]
    pub fn postgres(image: DatabaseImage) -> Self {
        Self {
            cli: OsString::from(DEFAULT_CLI),
            image,
            container_port: POSTGRES_PORT,
            env: vec![
                ("POSTGRES_USER".to_owned(), POSTGRES_USER.to_owned()),
                ("POSTGRES_PASSWORD".to_owned(), POSTGRES_PASSWORD.to_owned()),
                ("POSTGRES_DB".to_owned(), POSTGRES_DB.to_owned()),
            ],
            database: POSTGRES_DB.to_owned(),
            user: POSTGRES_USER.to_owned(),
            password: POSTGRES_PASSWORD.to_owned(),
            // The entrypoint's initialisation server only listens on a socket,
            // so checking over TCP waits for the final server.
            readiness_check: [
                "pg_isready",
                "-h",
                LOOPBACK,
                "-U",
                POSTGRES_USER,
                "-d",
                POSTGRES_DB,
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }

    /// Use another container CLI, such as `podman`.
    #[must_use]
    pub fn with_cli(mut self, cli: impl Into<OsString>) -> Self {
        self.cli = cli.into();
        self
    }

    fn provisioning_error(&self, message: impl Into<String>) -> FixtureError {
        FixtureError::DatabaseProvisioning {
            image: self.image.to_string(),
            message: message.into(),
        }
    }

    fn run_cli(&self, args: &[&str]) -> Result<Output, FixtureError> {
        Command::new(&self.cli)
            .args(args)
            .output()
            .map_err(|error| {
                self.provisioning_error(format!(
                    "could not run {}: {error}",
                    self.cli.to_string_lossy()
                ))
            })
    }
}

impl DatabaseEngine for ContainerEngine {
    fn image(&self) -> &DatabaseImage {
        &self.image
    }

    fn provision(&self) -> Result<Box<dyn DatabaseInstance>, FixtureError> {
        let reference = self.image.to_string();
        let env_args: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let mut args = vec!["run", "-d", "-P"];
        for pair in &env_args {
            args.push("-e");
            args.push(pair);
        }
        args.push(&reference);

        let output = self.run_cli(&args)?;
        if !output.status.success() {
            return Err(self.provisioning_error(stderr_text(&output)));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if id.is_empty() {
            return Err(self.provisioning_error("container CLI returned no container id"));
        }
        info!(image = %reference, container = %id, "database container started");

        // From here on the container exists and must be removed on failure.
        let mut container = Container {
            cli: self.cli.clone(),
            id,
        };
        let port_spec = format!("{}/tcp", self.container_port);
        let host_port = self
            .run_cli(&["port", &container.id, &port_spec])
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| parse_published_port(&String::from_utf8_lossy(&output.stdout)));
        let Some(host_port) = host_port else {
            if let Err(error) = container.remove() {
                warn!(%error, "could not remove container after failed provisioning");
            }
            return Err(self.provisioning_error(format!(
                "no host port published for {port_spec}"
            )));
        };
        let instance = ContainerInstance {
            container,
            readiness_check: self.readiness_check.clone(),
            descriptor: ConnectionDescriptor::network(
                self.image.engine_name(),
                LOOPBACK,
                host_port,
                self.database.clone(),
                self.user.clone(),
                self.password.clone(),
            ),
        };
        Ok(Box::new(instance))
    }
}

/// Extract the host port from `<cli> port` output.
///
/// Accepts lines such as `0.0.0.0:49153` or `[::]:49153` and returns the first
/// port that parses.
///
/// # Examples
///
/// ```
/// use scenic_fixture::parse_published_port;
///
/// assert_eq!(parse_published_port("0.0.0.0:49153\n[::]:49153\n"), Some(49153));
/// assert_eq!(parse_published_port(""), None);
/// ```
#[must_use]
pub fn parse_published_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}

struct Container {
    cli: OsString,
    id: String,
}

impl Container {
    /// Run `command` inside the container; any failure is a readiness miss.
    fn exec(&self, command: &[String]) -> Result<(), String> {
        let output = Command::new(&self.cli)
            .arg("exec")
            .arg(&self.id)
            .args(command)
            .output()
            .map_err(|error| format!("could not run {}: {error}", self.cli.to_string_lossy()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "{} in container: {}",
                command.join(" "),
                stderr_text(&output)
            ))
        }
    }

    fn remove(&mut self) -> Result<(), FixtureError> {
        if self.id.is_empty() {
            return Ok(());
        }
        let id = std::mem::take(&mut self.id);
        debug!(container = %id, "removing database container");
        let output = Command::new(&self.cli)
            .args(["rm", "-f", &id])
            .output()
            .map_err(|error| FixtureError::Teardown {
                component: format!("container {id}"),
                message: error.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(FixtureError::Teardown {
                component: format!("container {id}"),
                message: stderr_text(&output),
            })
        }
    }
}

struct ContainerInstance {
    container: Container,
    readiness_check: Vec<String>,
    descriptor: ConnectionDescriptor,
}

impl DatabaseInstance for ContainerInstance {
    fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    fn probe(&mut self) -> Result<(), String> {
        self.container.exec(&self.readiness_check)?;
        let port = self
            .descriptor
            .port()
            .ok_or_else(|| "container has no published port".to_owned())?;
        let address = SocketAddr::from(([127, 0, 0, 1], port));
        TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)
            .map(drop)
            .map_err(|error| format!("{address}: {error}"))
    }

    fn teardown(&mut self) -> Result<(), FixtureError> {
        self.container.remove()
    }
}

fn stderr_text(output: &Output) -> String {
    let text = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if text.is_empty() {
        format!("container CLI exited with {}", output.status)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0.0.0.0:49153\n", Some(49153))]
    #[case("[::]:32768\n0.0.0.0:32768\n", Some(32768))]
    #[case("garbage\n127.0.0.1:5433", Some(5433))]
    #[case("Error: no public port", None)]
    #[case("", None)]
    fn parses_published_port(#[case] output: &str, #[case] expected: Option<u16>) {
        assert_eq!(parse_published_port(output), expected);
    }

    #[cfg(unix)]
    #[expect(clippy::expect_used, reason = "test setup failures should abort the test")]
    mod fake_cli {
        use std::fs;
        use std::net::TcpListener;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};

        use tempfile::TempDir;

        use super::*;
        use crate::config::ReadinessPolicy;
        use crate::database::DatabaseFixture;

        const READINESS_CALL: &str = "exec c0ffee pg_isready -h 127.0.0.1 -U scenic -d scenic";

        /// Writes a shell script standing in for `docker` that logs every call.
        fn fake_cli(dir: &TempDir, port_output: &str) -> (PathBuf, PathBuf) {
            fake_cli_with_exec(dir, port_output, "exit 0")
        }

        fn fake_cli_with_exec(dir: &TempDir, port_output: &str, exec_output: &str) -> (PathBuf, PathBuf) {
            let log = dir.path().join("calls.log");
            let script = dir.path().join("fake-docker");
            let body = format!(
                "#!/bin/sh\necho \"$@\" >> '{log}'\ncase \"$1\" in\n  run) echo c0ffee ;;\n  port) {port_output} ;;\n  exec) {exec_output} ;;\n  rm) ;;\nesac\n",
                log = log.display(),
            );
            fs::write(&script, body).expect("write fake cli");
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
                .expect("make fake cli executable");
            (script, log)
        }

        fn calls(log: &Path) -> Vec<String> {
            fs::read_to_string(log)
                .unwrap_or_default()
                .lines()
                .map(str::to_owned)
                .collect()
        }

        fn engine(cli: &Path) -> ContainerEngine {
            ContainerEngine::postgres(DatabaseImage::new("postgres", Some("16"))).with_cli(cli)
        }

        #[test]
        fn provisions_and_removes_container_once() {
            let dir = TempDir::new().expect("tempdir");
            let (cli, log) = fake_cli(&dir, "echo 0.0.0.0:49153");
            let mut instance = engine(&cli).provision().expect("provision");

            assert_eq!(instance.descriptor().port(), Some(49153));
            assert_eq!(instance.descriptor().scheme(), "postgres");
            instance.teardown().expect("first teardown");
            instance.teardown().expect("second teardown");

            let calls = calls(&log);
            assert!(
                calls
                    .first()
                    .is_some_and(|call| call.starts_with("run -d -P") && call.ends_with("postgres:16"))
            );
            assert_eq!(calls.iter().filter(|call| call.starts_with("rm -f")).count(), 1);
            assert_eq!(calls.last().map(String::as_str), Some("rm -f c0ffee"));
        }

        #[test]
        fn removes_container_when_no_port_is_published() {
            let dir = TempDir::new().expect("tempdir");
            let (cli, log) = fake_cli(&dir, "exit 1");
            let Err(FixtureError::DatabaseProvisioning { image, message }) =
                engine(&cli).provision()
            else {
                panic!("provisioning should fail without a published port");
            };
            assert_eq!(image, "postgres:16");
            assert!(message.contains("5432/tcp"));
            assert_eq!(calls(&log).last().map(String::as_str), Some("rm -f c0ffee"));
        }

        fn short_readiness() -> ReadinessPolicy {
            ReadinessPolicy {
                timeout: Duration::from_millis(300),
                interval: Duration::from_millis(20),
            }
        }

        #[test]
        fn published_port_alone_is_not_ready() {
            let dir = TempDir::new().expect("tempdir");
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind stand-in port");
            let port = listener.local_addr().expect("local addr").port();
            let (cli, log) = fake_cli_with_exec(
                &dir,
                &format!("echo 0.0.0.0:{port}"),
                "echo '127.0.0.1:5432 - no response' >&2; exit 2",
            );

            let Err(FixtureError::ReadinessTimeout {
                component,
                last_error,
                ..
            }) = DatabaseFixture::start(&engine(&cli), &short_readiness())
            else {
                panic!("a database that never answers must time out");
            };

            assert_eq!(component, "database");
            assert!(last_error.contains("no response"), "{last_error}");
            let calls = calls(&log);
            assert!(calls.iter().any(|call| call == READINESS_CALL), "{calls:?}");
            assert_eq!(calls.last().map(String::as_str), Some("rm -f c0ffee"));
        }

        #[test]
        fn ready_once_the_engine_answers() {
            let dir = TempDir::new().expect("tempdir");
            let listener = TcpListener::bind("127.0.0.1:0").expect("bind stand-in port");
            let port = listener.local_addr().expect("local addr").port();
            let (cli, log) = fake_cli(&dir, &format!("echo 0.0.0.0:{port}"));

            let fixture =
                DatabaseFixture::start(&engine(&cli), &short_readiness()).expect("database ready");
            assert_eq!(fixture.descriptor().and_then(ConnectionDescriptor::port), Some(port));
            fixture.stop().expect("teardown");

            let calls = calls(&log);
            assert!(calls.iter().any(|call| call == READINESS_CALL), "{calls:?}");
            assert_eq!(calls.last().map(String::as_str), Some("rm -f c0ffee"));
        }

        #[test]
        fn missing_cli_is_a_provisioning_error() {
            let dir = TempDir::new().expect("tempdir");
            let result = engine(&dir.path().join("no-such-cli")).provision();
            assert!(matches!(result, Err(FixtureError::DatabaseProvisioning { .. })));
        }
    }
}
