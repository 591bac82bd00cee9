use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap as Map,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use tempfile::NamedTempFile;

use crate::hasher::DigestHasher;

pub const ARG_BASE_IMAGE: &str = "BASE_IMAGE";
pub const ARG_IMAGE_VERSION: &str = "IMAGE_VERSION";
pub const ARG_PHP_VERSION: &str = "PHP_VERSION";
pub const ARG_SWOOLE_VERSION: &str = "SWOOLE_VERSION";
pub const ARG_CHANGE_SOURCE: &str = "CHANGE_SOURCE";
pub const ARG_IN_CHINA: &str = "IN_CHINA";
pub const ARG_TZ: &str = "TZ";
pub const ARG_BUILD_URL: &str = "BUILD_URL";
pub const ARG_BUILD_SHA256: &str = "BUILD_SHA256";

/// Every build argument understood by the provisioner, in the order they are
/// declared in a rendered Dockerfile.
pub const BUILD_ARGS: &[&str] = &[
    ARG_BASE_IMAGE,
    ARG_IMAGE_VERSION,
    ARG_IN_CHINA,
    ARG_CHANGE_SOURCE,
    ARG_PHP_VERSION,
    ARG_SWOOLE_VERSION,
    ARG_TZ,
    ARG_BUILD_URL,
    ARG_BUILD_SHA256,
];

pub const DEFAULT_BUILD_URL: &str =
    "https://gitee.com/xiagw/deploy.sh/raw/main/conf/dockerfile/root/opt/build.sh";
pub const DEFAULT_PHP_VERSION: &str = "8.3";
pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

/// A boolean-like build argument. Only the literal string `"true"` sets it.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag(pub bool);

impl Flag {
    pub fn parse(value: &str) -> Flag {
        Flag(value == "true")
    }

    pub fn is_set(self) -> bool {
        self.0
    }

    pub fn as_arg(self) -> &'static str {
        if self.0 {
            "true"
        } else {
            "false"
        }
    }
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Php,
    Java,
}

impl Runtime {
    pub fn default_base_image(self) -> &'static str {
        match self {
            Runtime::Php => "ubuntu",
            Runtime::Java => "amazoncorretto",
        }
    }

    pub fn default_image_version(self) -> &'static str {
        match self {
            Runtime::Php => "22.04",
            Runtime::Java => "8",
        }
    }

    /// Ports documented with `EXPOSE`. Nothing enforces them.
    pub fn exposed_ports(self) -> &'static [u16] {
        match self {
            Runtime::Php => &[80, 443, 8080, 9000],
            Runtime::Java => &[8080, 8081, 8082],
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::Php
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "php" => Ok(Runtime::Php),
            "java" => Ok(Runtime::Java),
            other => Err(format!("unknown runtime {:?}, expected php or java", other)),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Php => f.write_str("php"),
            Runtime::Java => f.write_str("java"),
        }
    }
}

/// The immutable parameter set of a single build.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParameters {
    pub runtime: Runtime,
    pub base_image: String,
    pub os_version: String,
    pub php_version: String,
    pub swoole_version: Option<String>,
    pub use_mirror: Flag,
    pub in_china: Flag,
    pub timezone: String,
    pub bootstrap_url: String,
    pub bootstrap_sha256: Option<String>,
}

impl BuildParameters {
    /// Resolves raw build arguments against the hard-coded defaults. An
    /// argument that is missing or empty takes its default.
    pub fn resolve(args: &Map<String, String>, runtime: Runtime) -> BuildParameters {
        let value = |key: &str| -> Option<String> {
            args.get(key)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_owned())
        };

        let flag = |key: &str| -> Flag {
            match value(key) {
                Some(raw) => {
                    let flag = Flag::parse(&raw);
                    if !flag.is_set() && raw != "false" {
                        warn!(
                            "{}={:?} is not the literal \"true\", treating it as false",
                            key, raw
                        );
                    }
                    flag
                }
                None => Flag::default(),
            }
        };

        BuildParameters {
            runtime,
            base_image: value(ARG_BASE_IMAGE)
                .unwrap_or_else(|| runtime.default_base_image().into()),
            os_version: value(ARG_IMAGE_VERSION)
                .unwrap_or_else(|| runtime.default_image_version().into()),
            php_version: value(ARG_PHP_VERSION).unwrap_or_else(|| DEFAULT_PHP_VERSION.into()),
            swoole_version: value(ARG_SWOOLE_VERSION),
            use_mirror: flag(ARG_CHANGE_SOURCE),
            in_china: flag(ARG_IN_CHINA),
            timezone: value(ARG_TZ).unwrap_or_else(|| DEFAULT_TIMEZONE.into()),
            bootstrap_url: value(ARG_BUILD_URL).unwrap_or_else(|| DEFAULT_BUILD_URL.into()),
            bootstrap_sha256: value(ARG_BUILD_SHA256)
                .map(|digest| digest.trim().to_lowercase())
                .filter(|digest| !digest.is_empty()),
        }
    }

    pub fn wants_mirror(&self) -> bool {
        self.use_mirror.is_set() || self.in_china.is_set()
    }

    /// The build arguments as they are exported to provisioning scripts.
    pub fn environment(&self) -> Map<String, String> {
        let mut environment = Map::new();
        environment.insert(ARG_BASE_IMAGE.into(), self.base_image.clone());
        environment.insert(ARG_IMAGE_VERSION.into(), self.os_version.clone());
        environment.insert(ARG_PHP_VERSION.into(), self.php_version.clone());
        environment.insert(
            ARG_SWOOLE_VERSION.into(),
            self.swoole_version.clone().unwrap_or_default(),
        );
        environment.insert(ARG_CHANGE_SOURCE.into(), self.use_mirror.as_arg().into());
        environment.insert(ARG_IN_CHINA.into(), self.in_china.as_arg().into());
        environment.insert(ARG_TZ.into(), self.timezone.clone());
        environment.insert(ARG_BUILD_URL.into(), self.bootstrap_url.clone());
        environment.insert(
            ARG_BUILD_SHA256.into(),
            self.bootstrap_sha256.clone().unwrap_or_default(),
        );
        environment
    }

    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.input(self);
        hasher.finalize().to_hex().to_string()
    }
}

impl Default for BuildParameters {
    fn default() -> Self {
        BuildParameters::resolve(&Map::new(), Runtime::default())
    }
}

/// Where the filesystem contract places things, relative to the image root
/// being provisioned and the build context it is provisioned from.
#[derive(Clone, Debug)]
pub struct Layout {
    pub root: PathBuf,
    pub context: PathBuf,
}

impl Layout {
    pub const OVERLAY_DIR: &'static str = "root";
    pub const BUILD_SCRIPT: &'static str = "opt/build.sh";
    pub const ONBUILD_SCRIPT: &'static str = "opt/onbuild.sh";
    pub const SOURCE_LIST: &'static str = "etc/apt/sources.list";
    pub const HOOK_MANIFEST: &'static str = "etc/provision/hook.yml";
    pub const APP_DIR: &'static str = "app";

    pub fn new<R, C>(root: R, context: C) -> Layout
    where
        R: Into<PathBuf>,
        C: Into<PathBuf>,
    {
        Layout {
            root: root.into(),
            context: context.into(),
        }
    }

    pub fn in_image_script(&self) -> PathBuf {
        self.root.join(Self::BUILD_SCRIPT)
    }

    pub fn context_script(&self) -> PathBuf {
        self.overlay_dir().join(Self::BUILD_SCRIPT)
    }

    pub fn overlay_dir(&self) -> PathBuf {
        self.context.join(Self::OVERLAY_DIR)
    }

    pub fn source_list(&self) -> PathBuf {
        self.root.join(Self::SOURCE_LIST)
    }

    pub fn hook_manifest(&self) -> PathBuf {
        self.root.join(Self::HOOK_MANIFEST)
    }

    /// Scripts run from the application directory, or from the build context
    /// when the image has none yet.
    pub fn work_dir(&self) -> PathBuf {
        let app_dir = self.root.join(Self::APP_DIR);
        if app_dir.is_dir() {
            app_dir
        } else {
            self.context.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootstrapSource {
    InImage(PathBuf),
    Context(PathBuf),
    Remote(String),
}

impl fmt::Display for BootstrapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootstrapSource::InImage(path) => write!(f, "in-image {}", path.display()),
            BootstrapSource::Context(path) => write!(f, "build context {}", path.display()),
            BootstrapSource::Remote(url) => write!(f, "remote {}", url),
        }
    }
}

/// A located bootstrap script. Fetched scripts live in a temporary file that
/// is removed by [`ResolvedScript::cleanup`] or on drop.
#[derive(Debug)]
pub struct ResolvedScript {
    pub source: BootstrapSource,
    path: PathBuf,
    temp_file: Option<NamedTempFile>,
}

impl ResolvedScript {
    pub fn local(source: BootstrapSource, path: PathBuf) -> ResolvedScript {
        ResolvedScript {
            source,
            path,
            temp_file: None,
        }
    }

    pub fn fetched(url: String, temp_file: NamedTempFile) -> ResolvedScript {
        ResolvedScript {
            source: BootstrapSource::Remote(url),
            path: temp_file.path().to_owned(),
            temp_file: Some(temp_file),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cleanup(self) -> anyhow::Result<()> {
        if let Some(temp_file) = self.temp_file {
            temp_file.close()?;
        }

        Ok(())
    }
}

/// A deferred action registered by a build and triggered only when a
/// downstream build extends the image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    /// Overlay directory, relative to the downstream build context.
    pub overlay_dir: PathBuf,
    /// Hook script, relative to the image root.
    pub onbuild_script: PathBuf,
    #[serde(default)]
    pub environment: Map<String, String>,
}

impl Hook {
    pub fn new(parameters: &BuildParameters) -> Hook {
        Hook {
            overlay_dir: PathBuf::from(Layout::OVERLAY_DIR),
            onbuild_script: PathBuf::from(Layout::ONBUILD_SCRIPT),
            environment: parameters.environment(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HookState {
    NotTriggered,
    OverlayCopied,
    HookScriptChecked,
    Executed,
    Skipped,
}

impl HookState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HookState::Executed | HookState::Skipped)
    }
}

impl fmt::Display for HookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            HookState::NotTriggered => "not triggered",
            HookState::OverlayCopied => "overlay copied",
            HookState::HookScriptChecked => "hook script checked",
            HookState::Executed => "executed",
            HookState::Skipped => "no hook script",
        };
        f.write_str(state)
    }
}
