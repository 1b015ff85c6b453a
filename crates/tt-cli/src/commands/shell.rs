//! Shell command implementation

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::output::{format_state, print_error, print_info, print_success, print_warning};
use crate::surface::{InteractiveSurface, SurfaceExit};
use tt_core::config::ShellConfig;
use tt_core::Endpoint;
use tt_session::status::{LogStatusSink, PidFileLease};
use tt_session::{Connection, ConnectionObserver, LifecycleEvent, ShellService};
use tt_transport::{connector_for, KeyFileCredentials};

/// Reports lifecycle changes of connections opened alongside the main one
struct BackgroundWatcher;

impl ConnectionObserver for BackgroundWatcher {
    fn on_lifecycle(&self, connection: &Arc<Connection>, event: &LifecycleEvent) {
        let line = format_state(&connection.endpoint().to_string(), connection.state());
        match event {
            LifecycleEvent::Established => print_success(&line),
            LifecycleEvent::Closed => print_info(&line),
            LifecycleEvent::ConnectFailed(e) => print_error(&format!("{}: {}", line, e)),
            LifecycleEvent::StreamFailed(e) => print_error(&format!("{}: {}", line, e)),
        }
    }
}

fn parse_endpoint(input: &str, config: &ShellConfig) -> Result<Endpoint> {
    Endpoint::parse(input, config.default_port)
        .with_context(|| format!("Invalid endpoint: {:?} (expected host[:port])", input))
}

/// Open a shell on `endpoint`, keeping connections to `background` open too
pub async fn shell_command(config: &ShellConfig, endpoint: &str, background: &[String]) -> Result<()> {
    let endpoint = parse_endpoint(endpoint, config)?;
    let background = background
        .iter()
        .map(|e| parse_endpoint(e, config))
        .collect::<Result<Vec<_>>>()?;

    let service = ShellService::from_config(
        config,
        connector_for(config),
        Arc::new(PidFileLease::default()),
        Arc::new(LogStatusSink),
    );
    let credentials = Arc::new(KeyFileCredentials::from_config(config));

    let watcher: Arc<dyn ConnectionObserver> = Arc::new(BackgroundWatcher);
    let mut watched = Vec::with_capacity(background.len());
    for extra in &background {
        let attachment = service
            .registry()
            .connect_or_attach(extra, credentials.clone(), &watcher)?;
        if attachment.created {
            print_info(&format!("Connecting to {} in the background...", extra));
        }
        watched.push(attachment);
    }

    let (surface, ui) = InteractiveSurface::new(config.refresh_interval, Box::new(std::io::stdout()));
    surface.set_paused(!config.auto_scroll);
    let observer: Arc<dyn ConnectionObserver> = surface.clone();

    let attachment = service
        .registry()
        .connect_or_attach(&endpoint, credentials.clone(), &observer)?;
    if attachment.created {
        print_info(&format!("Connecting to {}...", endpoint));
    }
    print_info("Type ~. to detach, ~p to pause output, ~q to close");

    let exit = surface.run(&attachment.connection, ui).await;
    service.detach_surface(&attachment);
    tracing::debug!("Surface for {} ended: {:?}", endpoint, exit);

    if exit == SurfaceExit::Detached && !attachment.connection.is_terminal() {
        print_success(&format!("Detached from {}", endpoint));
    }

    if !service.registry().is_idle() {
        print_info(&format!(
            "{} connection(s) still open; press Ctrl+C to close them",
            service.registry().len()
        ));
        tokio::select! {
            _ = service.registry().wait_idle() => {}
            _ = tokio::signal::ctrl_c() => {
                print_warning("Closing remaining connections");
            }
        }
    }

    for attachment in &watched {
        service.detach_surface(attachment);
    }
    service.shutdown();

    match exit {
        SurfaceExit::Failed => anyhow::bail!("Connection to {} failed", endpoint),
        SurfaceExit::Detached | SurfaceExit::Closed => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoint_uses_configured_port() {
        let config = ShellConfig {
            default_port: 5037,
            ..ShellConfig::default()
        };
        assert_eq!(
            parse_endpoint("10.0.0.5", &config).unwrap(),
            Endpoint::new("10.0.0.5", 5037)
        );
        assert_eq!(
            parse_endpoint("10.0.0.5:22", &config).unwrap(),
            Endpoint::new("10.0.0.5", 22)
        );
        assert!(parse_endpoint("10.0.0.5:notaport", &config).is_err());
    }
}
