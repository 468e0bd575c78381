use super::common::{AcceptingProbe, FakeServer, FileAdmin, RecordingAgent, init_tracing};
use server_harness::error::{Error, Result};
use server_harness::server::{LaunchSpec, ServerLifecycleManager, ServerStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_coverage_instruments_and_reports() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let mut config = server.config(2);
    config.coverage.enabled = true;
    config.coverage.properties_file = Some(PathBuf::from("/tmp/emma.properties"));

    let agent = Arc::new(RecordingAgent::default());
    let manager = Arc::new(
        ServerLifecycleManager::new(
            config.clone(),
            Arc::new(AcceptingProbe::default()),
            Arc::new(FileAdmin::new(&server.home)),
        )?
        .with_coverage_agent(agent.clone()),
    );

    let spec: LaunchSpec = [("-DportOffset", "2")].into_iter().collect();
    manager.start(server.instance(&config), &spec).await?;

    assert_eq!(agent.inits.load(Ordering::SeqCst), 1);
    assert_eq!(*agent.instrumented.lock().unwrap(), vec![server.home.clone()]);
    assert!(agent.reported.lock().unwrap().is_empty());

    let command = manager.command_line().await.unwrap();
    assert!(command.contains(&"-Demma.properties=/tmp/emma.properties".to_string()));
    assert!(command.contains(&"-Demma.rt.control.port=47655".to_string()));

    manager.stop(2).await?;

    assert_eq!(
        *agent.reported.lock().unwrap(),
        vec![vec![server.home.clone()]]
    );

    Ok(())
}

#[tokio::test]
async fn test_coverage_without_agent_fails_before_launch() -> Result<()> {
    let server = FakeServer::new().await;
    let mut config = server.config(0);
    config.coverage.enabled = true;
    config.coverage.properties_file = Some(PathBuf::from("/tmp/emma.properties"));

    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    let result = manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await;

    assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.pid().await.is_none());

    Ok(())
}

#[test]
fn test_coverage_enabled_without_properties_is_invalid() {
    let mut config = server_harness::HarnessConfig::default();
    config.coverage.enabled = true;

    let result = ServerLifecycleManager::new(
        config,
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(std::path::Path::new("/nonexistent"))),
    );

    assert!(matches!(result, Err(Error::ConfigInvalid(_))));
}
