use super::common::{
    AcceptingProbe, FakeServer, FileAdmin, RejectingProbe, SHORT_LIVED_SCRIPT, SlowBootProbe,
    init_tracing,
};
use async_trait::async_trait;
use mockall::mock;
use server_harness::admin::{AdminClient, AdminConnector, AdminEndpoint};
use server_harness::error::{Error, Result};
use server_harness::server::{
    LaunchSpec, ServerInstance, ServerLifecycleEvent, ServerLifecycleManager, ServerStatus,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

mock! {
    pub Admin {}

    #[async_trait]
    impl AdminClient for Admin {
        async fn shutdown(&self) -> Result<()>;
        async fn restart_gracefully(&self) -> Result<()>;
    }
}

mock! {
    pub Connector {}

    impl AdminConnector for Connector {
        fn connect(&self, endpoint: AdminEndpoint) -> Result<Arc<dyn AdminClient>>;
    }
}

fn event_kinds(manager: &ServerLifecycleManager) -> Vec<ServerLifecycleEvent> {
    manager.events(None).iter().map(|event| event.event).collect()
}

#[tokio::test]
async fn test_start_and_stop_primary_instance() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let config = server.config(0);
    let admin = Arc::new(FileAdmin::new(&server.home));
    let probe = Arc::new(AcceptingProbe::default());
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        probe.clone(),
        admin.clone(),
    )?);

    assert_eq!(manager.status(), ServerStatus::Stopped);
    manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await?;

    assert_eq!(manager.status(), ServerStatus::Running);
    assert!(manager.pid().await.is_some());
    assert!(probe.attempts.load(Ordering::SeqCst) >= 1);
    let output = manager.server_output().await.unwrap();
    assert!(output.contains("Mgt Console URL"));

    let context = manager.execution_context().unwrap();
    assert_eq!(context.server_home(), server.home.as_path());
    assert_eq!(context.working_dir(), server.home.as_path());

    manager.stop(0).await?;

    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.pid().await.is_none());
    assert!(manager.execution_context().is_none());

    let endpoints = admin.endpoints();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(
        endpoints[0].backend_url,
        format!("https://127.0.0.1:{}/services/", server.port)
    );
    assert_eq!(endpoints[0].credentials.username, "admin");

    assert_eq!(
        event_kinds(&manager),
        vec![ServerLifecycleEvent::Stopped, ServerLifecycleEvent::Started]
    );

    Ok(())
}

#[tokio::test]
async fn test_concurrent_starts_launch_once() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let config = server.config(0);
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(&server.home)),
    )?);
    let spec = LaunchSpec::new();

    let (first, second) = tokio::join!(
        manager.start(server.instance(&config), &spec),
        manager.start(server.instance(&config), &spec),
    );
    first?;
    second?;

    assert_eq!(event_kinds(&manager), vec![ServerLifecycleEvent::Started]);
    assert_eq!(manager.status(), ServerStatus::Running);

    // Starting a running server is a no-op
    let pid = manager.pid().await;
    manager.start(server.instance(&config), &spec).await?;
    assert_eq!(manager.pid().await, pid);

    manager.stop(0).await?;
    Ok(())
}

#[tokio::test]
async fn test_launch_args_and_offset_instance() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let config = server.config(5);
    let admin = Arc::new(FileAdmin::new(&server.home));
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        admin.clone(),
    )?);

    let spec: LaunchSpec = [("-Dfoo", "bar"), ("cmdArg", "-x -y"), ("-DportOffset", "5")]
        .into_iter()
        .collect();
    let before = spec.clone();

    manager.start(server.instance(&config), &spec).await?;

    assert_eq!(spec, before);
    let command = manager.command_line().await.unwrap();
    assert_eq!(&command[..2], &["sh", "bin/wso2server.sh"]);
    assert_eq!(
        &command[2..],
        &["-Dfoo=bar", "-DportOffset=5", "-x", "-y"]
    );
    let output = manager.server_output().await.unwrap();
    assert!(output.contains("args: -Dfoo=bar -DportOffset=5 -x -y"));

    // Only the offset-0 instance publishes a context
    assert!(manager.execution_context().is_none());

    manager.stop(5).await?;

    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert_eq!(
        admin.endpoints()[0].backend_url,
        format!("https://127.0.0.1:{}/services/", server.port)
    );

    Ok(())
}

#[tokio::test]
async fn test_stop_at_other_offset_keeps_context() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let mut config = server.config(0);
    config.lifecycle.shutdown_marker_timeout_secs = 1;
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await?;
    manager.stop(5).await?;

    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.pid().await.is_none());
    assert_eq!(
        manager.execution_context().map(|context| context.server_home().to_path_buf()),
        Some(server.home.clone())
    );

    Ok(())
}

#[tokio::test]
async fn test_stop_without_server_is_noop() -> Result<()> {
    let server = FakeServer::closed().await;
    let admin = Arc::new(FileAdmin::new(&server.home));
    let manager =
        ServerLifecycleManager::new(server.config(0), Arc::new(AcceptingProbe::default()), admin.clone())?;

    manager.stop(0).await?;
    manager.stop(0).await?;

    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(admin.endpoints().is_empty());
    assert!(manager.events(None).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_missing_startup_script_leaves_manager_stopped() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let config = server.config(0);
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    let empty_home = tempfile::tempdir().unwrap();
    let instance = ServerInstance::from_config(&config, empty_home.path());

    let result = manager.start(instance, &LaunchSpec::new()).await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.execution_context().is_none());
    assert!(manager.pid().await.is_none());
    assert_eq!(event_kinds(&manager), vec![ServerLifecycleEvent::Failed]);

    Ok(())
}

#[tokio::test]
async fn test_invalid_port_offset_is_rejected() -> Result<()> {
    let server = FakeServer::closed().await;
    let config = server.config(0);
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    let spec: LaunchSpec = [("-DportOffset", "five")].into_iter().collect();
    let result = manager.start(server.instance(&config), &spec).await;

    assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    assert_eq!(manager.status(), ServerStatus::Stopped);

    Ok(())
}

#[tokio::test]
async fn test_port_timeout_tears_down_and_allows_retry() -> Result<()> {
    init_tracing();
    let mut server = FakeServer::closed().await;
    let mut config = server.config(0);
    config.lifecycle.port_timeout_secs = 1;
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    let result = manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await;

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.pid().await.is_none());
    assert!(manager.execution_context().is_none());

    server.open().await;
    manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await?;
    assert_eq!(manager.status(), ServerStatus::Running);
    assert!(manager.execution_context().is_some());

    manager.stop(0).await?;
    assert_eq!(
        event_kinds(&manager),
        vec![
            ServerLifecycleEvent::Stopped,
            ServerLifecycleEvent::Started,
            ServerLifecycleEvent::Failed,
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_rejected_login_fails_fast() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let mut config = server.config(0);
    config.lifecycle.login_timeout_secs = 60;
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(RejectingProbe),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    let started = Instant::now();
    let result = manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await;

    assert!(matches!(result, Err(Error::Rejected(_))));
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.pid().await.is_none());

    let events = manager.events(Some(1));
    assert_eq!(events[0].event, ServerLifecycleEvent::Failed);
    assert!(events[0].details.as_deref().unwrap().contains("Invalid credentials"));

    Ok(())
}

#[tokio::test]
async fn test_failed_remote_shutdown_keeps_server() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let config = server.config(0);

    let mut client = MockAdmin::new();
    client
        .expect_shutdown()
        .times(1)
        .returning(|| Err(Error::RemoteAdmin("Connection refused".to_string())));
    let client: Arc<dyn AdminClient> = Arc::new(client);

    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .times(1)
        .returning(move |_| Ok(Arc::clone(&client)));

    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(connector),
    )?);
    manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await?;
    let pid = manager.pid().await;

    let result = manager.stop(0).await;

    assert!(matches!(result, Err(Error::RemoteAdmin(_))));
    assert_eq!(manager.status(), ServerStatus::Running);
    assert_eq!(manager.pid().await, pid);
    assert!(manager.execution_context().is_some());

    Ok(())
}

#[tokio::test]
async fn test_stop_without_open_port_skips_remote_shutdown() -> Result<()> {
    init_tracing();
    let mut server = FakeServer::new().await;
    let mut config = server.config(0);
    config.lifecycle.shutdown_marker_timeout_secs = 1;
    let admin = Arc::new(FileAdmin::new(&server.home));
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        admin.clone(),
    )?);

    manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await?;
    server.close().await;

    // Nothing listens on the https port anymore, so the process is killed
    // once the shutdown marker wait runs out
    manager.stop(0).await?;

    assert!(admin.endpoints().is_empty());
    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.pid().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_start_waits_for_slow_login() -> Result<()> {
    init_tracing();
    let server = FakeServer::new().await;
    let mut config = server.config(0);
    config.lifecycle.login_timeout_secs = 10;

    let started = Instant::now();
    let probe = Arc::new(SlowBootProbe::new(Duration::from_secs(3)));
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        probe.clone(),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await?;

    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(probe.attempts.load(Ordering::SeqCst) > 1);
    assert_eq!(manager.status(), ServerStatus::Running);
    assert_eq!(event_kinds(&manager), vec![ServerLifecycleEvent::Started]);

    manager.stop(0).await?;
    assert_eq!(manager.status(), ServerStatus::Stopped);

    Ok(())
}

#[tokio::test]
async fn test_stop_after_server_exited_skips_marker_wait() -> Result<()> {
    init_tracing();
    let mut server = FakeServer::with_script(SHORT_LIVED_SCRIPT).await;
    server.open().await;
    let mut config = server.config(0);
    config.lifecycle.shutdown_marker_timeout_secs = 60;
    let manager = Arc::new(ServerLifecycleManager::new(
        config.clone(),
        Arc::new(AcceptingProbe::default()),
        Arc::new(FileAdmin::new(&server.home)),
    )?);

    manager
        .start(server.instance(&config), &LaunchSpec::new())
        .await?;

    // Let the script run to its end so stdout is closed
    tokio::time::sleep(Duration::from_secs(2)).await;
    let output = manager.server_output().await.unwrap();
    assert!(output.contains("OutOfMemoryError"));

    let stopping = Instant::now();
    manager.stop(0).await?;

    assert!(stopping.elapsed() < Duration::from_secs(10));
    assert_eq!(manager.status(), ServerStatus::Stopped);
    assert!(manager.pid().await.is_none());

    Ok(())
}
