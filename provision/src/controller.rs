use anyhow::Result;
use log::{debug, info, warn};
use std::{
    fs::{self, File},
    io::Write,
};
use tempfile::Builder as TempFileBuilder;

use crate::{
    error::ProvisionError,
    hasher::sha256_hex,
    mirror::{MirrorOutcome, MirrorRule},
    models::{BootstrapSource, BuildParameters, Hook, HookState, Layout, ResolvedScript},
    overlay::{self, OverlayReport},
    services::{ScriptFetcher, ScriptRunner},
};

#[derive(Debug)]
pub struct BuildReport {
    pub mirror: MirrorOutcome,
    pub source: BootstrapSource,
    pub overlay: Option<OverlayReport>,
    pub hook: Hook,
}

#[derive(Debug)]
pub struct ExtendReport {
    pub overlay: OverlayReport,
    pub state: HookState,
}

/// Runs the provisioning procedure of one image build. `build` provisions the
/// image itself and registers the hook, `extend` triggers that hook from a
/// downstream build.
pub struct Provisioner {
    layout: Layout,
    parameters: BuildParameters,
    mirror: MirrorRule,
    fetcher: Box<dyn ScriptFetcher>,
    runner: Box<dyn ScriptRunner>,
}

impl Provisioner {
    pub fn init<F, R>(
        layout: Layout,
        parameters: BuildParameters,
        fetcher: F,
        runner: R,
    ) -> Provisioner
    where
        F: 'static + ScriptFetcher,
        R: 'static + ScriptRunner,
    {
        Provisioner {
            layout,
            parameters,
            mirror: MirrorRule::default(),
            fetcher: Box::new(fetcher),
            runner: Box::new(runner),
        }
    }

    pub fn with_mirror(mut self, mirror: MirrorRule) -> Provisioner {
        self.mirror = mirror;
        self
    }

    pub fn build(&mut self) -> Result<BuildReport> {
        let mirror = self.localize_mirror()?;

        let script = self.resolve_bootstrap()?;
        let source = script.source.clone();
        self.execute(&script)?;
        script.cleanup()?;

        let overlay_dir = self.layout.overlay_dir();
        let overlay = if overlay_dir.is_dir() {
            Some(overlay::copy_overlay(&overlay_dir, &self.layout.root)?)
        } else {
            debug!("no overlay at {:?}", overlay_dir);
            None
        };

        let hook = self.register_hook()?;

        Ok(BuildReport {
            mirror,
            source,
            overlay,
            hook,
        })
    }

    pub fn localize_mirror(&mut self) -> Result<MirrorOutcome> {
        if !self.parameters.wants_mirror() {
            debug!("mirror localization is disabled");
            return Ok(MirrorOutcome::Disabled);
        }

        self.mirror.apply(self.layout.source_list())
    }

    /// Picks the bootstrap script: one already in the image, then one in the
    /// build context, then a download. The first hit wins.
    pub fn resolve_bootstrap(&mut self) -> Result<ResolvedScript> {
        let in_image = self.layout.in_image_script();
        if in_image.is_file() {
            info!("found bootstrap script {:?} in the image", in_image);
            return Ok(ResolvedScript::local(
                BootstrapSource::InImage(in_image.clone()),
                in_image,
            ));
        }

        let in_context = self.layout.context_script();
        if in_context.is_file() {
            info!("found bootstrap script {:?} in the build context", in_context);
            return Ok(ResolvedScript::local(
                BootstrapSource::Context(in_context.clone()),
                in_context,
            ));
        }

        let url = self.parameters.bootstrap_url.clone();
        info!("fetching bootstrap script from {}", url);
        let body = self.fetcher.fetch(&url)?;

        match &self.parameters.bootstrap_sha256 {
            Some(expected) => {
                let actual = sha256_hex(&body);
                if actual != *expected {
                    return Err(ProvisionError::ChecksumMismatch {
                        url,
                        expected: expected.clone(),
                        actual,
                    }
                    .into());
                }
                info!("bootstrap script matches sha256 {}", expected);
            }
            None => warn!(
                "running unverified bootstrap script from {}, set BUILD_SHA256 to pin it",
                url
            ),
        }

        let mut temp_file = TempFileBuilder::new()
            .prefix("build-")
            .suffix(".sh")
            .tempfile()?;
        temp_file.write_all(&body)?;
        temp_file.flush()?;

        Ok(ResolvedScript::fetched(url, temp_file))
    }

    pub fn execute(&mut self, script: &ResolvedScript) -> Result<()> {
        info!("provisioning with {}", script.source);
        self.runner.run(
            script.path(),
            &self.parameters.environment(),
            &self.layout.work_dir(),
        )
    }

    /// Records the hook in the image so that a downstream build can trigger it.
    pub fn register_hook(&mut self) -> Result<Hook> {
        let hook = Hook::new(&self.parameters);
        let manifest = self.layout.hook_manifest();

        if let Some(parent) = manifest.parent() {
            fs::create_dir_all(parent)?;
        }
        serde_yaml::to_writer(File::create(&manifest)?, &hook)?;
        info!("registered hook in {:?}", manifest);

        Ok(hook)
    }

    /// The downstream half: copies the overlay, then runs the hook script if
    /// the image has one. No rollback on failure.
    pub fn extend(&mut self) -> Result<ExtendReport> {
        let manifest = self.layout.hook_manifest();
        if !manifest.is_file() {
            return Err(ProvisionError::NoHook { path: manifest }.into());
        }
        let hook: Hook = serde_yaml::from_reader(File::open(&manifest)?)?;

        let mut state = HookState::NotTriggered;
        debug!("hook state {:?}", state);

        let overlay = overlay::copy_overlay(
            self.layout.context.join(&hook.overlay_dir),
            &self.layout.root,
        )?;
        state = HookState::OverlayCopied;
        debug!("hook state {:?}", state);

        let script = self.layout.root.join(&hook.onbuild_script);
        let present = script.is_file();
        state = HookState::HookScriptChecked;
        debug!("hook state {:?}", state);

        state = if present {
            self.runner
                .run(&script, &hook.environment, &self.layout.work_dir())?;
            HookState::Executed
        } else {
            info!("no hook script at {:?}, nothing to run", script);
            HookState::Skipped
        };
        debug!("hook state {:?}", state);

        Ok(ExtendReport { overlay, state })
    }
}
