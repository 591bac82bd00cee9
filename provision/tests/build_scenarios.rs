use provision::{
    backends::{HttpFetcher, ShellRunner},
    controller::Provisioner,
    error::ProvisionError,
    hasher::sha256_hex,
    mirror::MirrorOutcome,
    models::{BootstrapSource, BuildParameters, HookState, Layout, Runtime},
};
use std::{
    collections::BTreeMap as Map,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tempfile::TempDir;
use tiny_http::{Response, Server, StatusCode};

const BUILD_SCRIPT: &str = "echo \"$PHP_VERSION $IN_CHINA\" > provisioned\n";

struct ScriptServer {
    url: String,
    requests: Arc<AtomicUsize>,
    handle: thread::JoinHandle<()>,
}

impl ScriptServer {
    fn join(self) -> usize {
        self.handle.join().expect("server thread");
        self.requests.load(Ordering::SeqCst)
    }
}

/// Serves `body` at `/build.sh` and 404 everywhere else, until idle.
fn spawn_script_server(body: &'static str) -> ScriptServer {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let addr = server.server_addr().to_ip().expect("ip listener");
    let url = format!("http://{}/build.sh", addr);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&requests);

    let handle = thread::spawn(move || loop {
        let request = match server.recv_timeout(Duration::from_secs(2)) {
            Ok(Some(request)) => request,
            Ok(None) | Err(_) => break,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let _ = if request.url() == "/build.sh" {
            request.respond(Response::from_string(body))
        } else {
            request.respond(Response::empty(StatusCode(404)))
        };
    });

    ScriptServer {
        url,
        requests,
        handle,
    }
}

fn image_root() -> TempDir {
    let root = TempDir::new().expect("root");
    fs::create_dir_all(root.path().join("app")).expect("app dir");
    fs::create_dir_all(root.path().join("etc/apt")).expect("apt dir");
    fs::write(
        root.path().join("etc/apt/sources.list"),
        "deb http://archive.ubuntu.com/ubuntu/ jammy main\n",
    )
    .expect("sources.list");
    root
}

fn provisioner(root: &Path, context: &Path, args: &[(&str, &str)]) -> Provisioner {
    let args = args
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<Map<_, _>>();

    Provisioner::init(
        Layout::new(root, context),
        BuildParameters::resolve(&args, Runtime::Php),
        HttpFetcher::new().expect("http client"),
        ShellRunner::new("sh"),
    )
}

#[test]
fn mirrored_build_fetches_and_runs_the_remote_script() {
    let server = spawn_script_server(BUILD_SCRIPT);
    let root = image_root();
    let context = TempDir::new().unwrap();

    let report = provisioner(
        root.path(),
        context.path(),
        &[
            ("CHANGE_SOURCE", "true"),
            ("IN_CHINA", "true"),
            ("PHP_VERSION", "8.1"),
            ("BUILD_URL", server.url.as_str()),
            ("BUILD_SHA256", sha256_hex(BUILD_SCRIPT.as_bytes()).as_str()),
        ],
    )
    .build()
    .expect("build");

    assert_eq!(report.mirror, MirrorOutcome::Rewritten { replacements: 1 });
    assert_eq!(report.source, BootstrapSource::Remote(server.url.clone()));
    let sources = fs::read_to_string(root.path().join("etc/apt/sources.list")).unwrap();
    assert!(sources.contains("mirrors.ustc.edu.cn"));
    assert_eq!(
        fs::read_to_string(root.path().join("app/provisioned")).unwrap(),
        "8.1 true\n"
    );
    assert!(root.path().join("etc/provision/hook.yml").is_file());
    assert_eq!(server.join(), 1);
}

#[test]
fn in_image_script_makes_no_request() {
    let server = spawn_script_server(BUILD_SCRIPT);
    let root = image_root();
    let context = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("opt")).unwrap();
    fs::write(root.path().join("opt/build.sh"), "echo local > provisioned\n").unwrap();

    provisioner(root.path(), context.path(), &[("BUILD_URL", server.url.as_str())])
        .build()
        .expect("build");

    assert_eq!(
        fs::read_to_string(root.path().join("app/provisioned")).unwrap(),
        "local\n"
    );
    assert_eq!(server.join(), 0);
}

#[test]
fn missing_remote_script_fails_the_build() {
    let server = spawn_script_server(BUILD_SCRIPT);
    let root = image_root();
    let context = TempDir::new().unwrap();
    let url = server.url.replace("build.sh", "missing.sh");

    let err = provisioner(root.path(), context.path(), &[("BUILD_URL", url.as_str())])
        .build()
        .unwrap_err();

    match err.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::Fetch { reason, .. }) => assert!(reason.contains("404")),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!root.path().join("app/provisioned").exists());
    assert!(!root.path().join("etc/provision/hook.yml").exists());
    assert_eq!(server.join(), 1);
}

#[test]
fn failing_remote_script_fails_the_build() {
    let server = spawn_script_server("exit 7\n");
    let root = image_root();
    let context = TempDir::new().unwrap();

    let err = provisioner(root.path(), context.path(), &[("BUILD_URL", server.url.as_str())])
        .build()
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::ScriptFailed { .. })
    ));
    assert!(!root.path().join("etc/provision/hook.yml").exists());
    server.join();
}

#[test]
fn downstream_build_triggers_the_hook() {
    let root = image_root();
    let context = TempDir::new().unwrap();
    fs::create_dir_all(context.path().join("root/opt")).unwrap();
    fs::write(
        context.path().join("root/opt/build.sh"),
        "echo base > provisioned\n",
    )
    .unwrap();
    provisioner(root.path(), context.path(), &[("PHP_VERSION", "7.4")])
        .build()
        .expect("base build");

    let downstream = TempDir::new().unwrap();
    fs::create_dir_all(downstream.path().join("root/opt")).unwrap();
    fs::write(
        downstream.path().join("root/opt/onbuild.sh"),
        "echo \"onbuild $PHP_VERSION\" > extended\n",
    )
    .unwrap();

    let report = provisioner(root.path(), downstream.path(), &[])
        .extend()
        .expect("extend");

    assert_eq!(report.state, HookState::Executed);
    assert_eq!(
        fs::read_to_string(root.path().join("app/extended")).unwrap(),
        "onbuild 7.4\n"
    );
}

#[test]
fn failing_hook_script_fails_the_downstream_build() {
    let root = image_root();
    let context = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("opt")).unwrap();
    fs::write(root.path().join("opt/build.sh"), "true\n").unwrap();
    provisioner(root.path(), context.path(), &[])
        .build()
        .expect("base build");

    let downstream = TempDir::new().unwrap();
    fs::create_dir_all(downstream.path().join("root/opt")).unwrap();
    fs::write(downstream.path().join("root/opt/onbuild.sh"), "exit 1\n").unwrap();

    let err = provisioner(root.path(), downstream.path(), &[])
        .extend()
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::ScriptFailed { .. })
    ));
}
