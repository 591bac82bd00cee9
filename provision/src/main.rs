use anyhow::Result;
use crossterm::{
    cursor,
    style::{self, Colorize, Styler},
    QueueableCommand,
};
use log::info;
use std::{
    io::{stdout, Write},
    path::PathBuf,
};
use structopt::StructOpt;

use provision::{
    backends::{HttpFetcher, ShellRunner},
    controller::Provisioner,
    dockerfile,
    frontends::{merge_arguments, EnvironmentFrontend, MapList, ParamsFileFrontend},
    mirror::{MirrorOutcome, MirrorRule},
    models::{BuildParameters, Layout, Runtime},
    services::ParameterFrontend,
};

#[derive(Debug, StructOpt)]
struct ParamsOpt {
    #[structopt(long, default_value = ".", parse(from_os_str))]
    /// Build context holding the `root/` overlay and the parameter file.
    context: PathBuf,

    #[structopt(long = "arg", number_of_values = 1)]
    /// Build argument override, as KEY=VALUE.
    args: Vec<String>,

    #[structopt(long, default_value = "php")]
    runtime: Runtime,
}

#[derive(Debug, StructOpt)]
struct RunOpt {
    #[structopt(long, default_value = "/", parse(from_os_str))]
    /// Root of the image filesystem being provisioned.
    root: PathBuf,

    #[structopt(long, default_value = "bash")]
    shell: String,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "provision",
    about = "Provisions PHP runtime images and the images built from them."
)]
enum Opt {
    /// Localizes the mirror, runs the bootstrap script and registers the hook.
    Build {
        #[structopt(flatten)]
        params: ParamsOpt,

        #[structopt(flatten)]
        run: RunOpt,
    },
    /// Triggers the hook of the base image from a downstream build.
    Extend {
        #[structopt(long, default_value = ".", parse(from_os_str))]
        context: PathBuf,

        #[structopt(flatten)]
        run: RunOpt,
    },
    /// Prints the Dockerfile template for the resolved parameters.
    Render {
        #[structopt(flatten)]
        params: ParamsOpt,
    },
    /// Prints the resolved build parameters.
    Params {
        #[structopt(flatten)]
        params: ParamsOpt,
    },
}

fn resolve_parameters(params: &ParamsOpt) -> Result<(BuildParameters, MirrorRule)> {
    let mut file = ParamsFileFrontend::discover(&params.context)?;
    let mut environment = EnvironmentFrontend::new()?;
    let mut command_line = MapList::List(params.args.clone());

    let mirror = file.mirror();
    let arguments = merge_arguments(&mut [
        &mut file as &mut dyn ParameterFrontend,
        &mut environment,
        &mut command_line,
    ])?;
    info!("build arguments {:?}", arguments);

    Ok((BuildParameters::resolve(&arguments, params.runtime), mirror))
}

fn main() -> Result<()> {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    let mut stdout = stdout();

    match opt {
        Opt::Build { params, run } => {
            let (parameters, mirror) = resolve_parameters(&params)?;
            let layout = Layout::new(run.root, params.context);
            let manifest = layout.hook_manifest();

            let mut provisioner = Provisioner::init(
                layout,
                parameters,
                HttpFetcher::new()?,
                ShellRunner::new(run.shell),
            )
            .with_mirror(mirror);
            let report = provisioner.build()?;

            let mirror = match report.mirror {
                MirrorOutcome::Disabled => "disabled".to_string(),
                MirrorOutcome::Unchanged => "unchanged".to_string(),
                MirrorOutcome::Rewritten { replacements } => {
                    format!("{} replacements", replacements)
                }
            };
            let overlay = report
                .overlay
                .map(|overlay| overlay.to_string())
                .unwrap_or_else(|| "none".into());

            print_steps(
                &mut stdout,
                vec![
                    ("Localizing mirror".into(), mirror),
                    ("Bootstrapping".into(), report.source.to_string()),
                    ("Copying overlay".into(), overlay),
                    ("Registering hook".into(), manifest.display().to_string()),
                ],
            )?;
        }
        Opt::Extend { context, run } => {
            let layout = Layout::new(run.root, context);

            let mut provisioner = Provisioner::init(
                layout,
                BuildParameters::default(),
                HttpFetcher::new()?,
                ShellRunner::new(run.shell),
            );
            let report = provisioner.extend()?;

            print_steps(
                &mut stdout,
                vec![
                    ("Copying overlay".into(), report.overlay.to_string()),
                    ("Running hook script".into(), report.state.to_string()),
                ],
            )?;
        }
        Opt::Render { params } => {
            let (parameters, mirror) = resolve_parameters(&params)?;
            stdout.write_all(dockerfile::render(&parameters, &mirror).as_bytes())?;
        }
        Opt::Params { params } => {
            let (parameters, _) = resolve_parameters(&params)?;
            serde_yaml::to_writer(&mut stdout, &parameters)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}

/// Prints one aligned line per completed step.
fn print_steps(stdout: &mut impl Write, steps: Vec<(String, String)>) -> Result<()> {
    let longest_line = steps.iter().map(|(line, _)| line.len()).max().unwrap_or(0);

    for (line, outcome) in steps.iter() {
        let padding = longest_line - line.len() + 1;

        stdout
            .queue(style::Print(line))?
            .queue(cursor::MoveRight(padding as u16))?
            .queue(style::Print("... "))?
            .queue(style::PrintStyledContent("done".green().bold()))?
            .queue(style::Print(format!(" ({})\n", outcome)))?;
    }

    stdout.flush()?;

    Ok(())
}
