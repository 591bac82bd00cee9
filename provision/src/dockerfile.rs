use std::fmt::{self, Write};

use crate::{
    mirror::MirrorRule,
    models::{
        BuildParameters, Layout, Runtime, ARG_BASE_IMAGE, ARG_BUILD_SHA256, ARG_BUILD_URL,
        ARG_CHANGE_SOURCE, ARG_IMAGE_VERSION, ARG_IN_CHINA, ARG_PHP_VERSION, ARG_SWOOLE_VERSION,
        ARG_TZ,
    },
};

pub const LABEL_PARAMS_DIGEST: &str = "io.provision.params-digest";
pub const ENTRYPOINT_SCRIPT: &str = "/opt/run0.sh";

/// Renders the Dockerfile template of an image variant, with the resolved
/// parameters as `ARG` defaults.
pub fn render(parameters: &BuildParameters, mirror: &MirrorRule) -> String {
    let mut out = String::new();
    write_dockerfile(&mut out, parameters, mirror).expect("writing to a String never fails");
    out
}

fn write_dockerfile(
    out: &mut String,
    parameters: &BuildParameters,
    mirror: &MirrorRule,
) -> fmt::Result {
    let runtime = parameters.runtime;
    let environment = parameters.environment();
    let arg = |out: &mut String, key: &str| writeln!(out, "ARG {}={}", key, environment[key]);

    arg(out, ARG_BASE_IMAGE)?;
    arg(out, ARG_IMAGE_VERSION)?;
    writeln!(out, "FROM ${{{}}}:${{{}}}", ARG_BASE_IMAGE, ARG_IMAGE_VERSION)?;
    writeln!(out)?;

    let description = match runtime {
        Runtime::Php => "PHP runtime base image",
        Runtime::Java => "Java runtime base image",
    };
    writeln!(
        out,
        "LABEL org.opencontainers.image.description=\"{}\" \\",
        description
    )?;
    writeln!(out, "    {}=\"{}\"", LABEL_PARAMS_DIGEST, parameters.digest())?;
    writeln!(out)?;

    arg(out, ARG_IN_CHINA)?;
    arg(out, ARG_CHANGE_SOURCE)?;
    if runtime == Runtime::Php {
        arg(out, ARG_PHP_VERSION)?;
        arg(out, ARG_SWOOLE_VERSION)?;
    }
    arg(out, ARG_TZ)?;
    arg(out, ARG_BUILD_URL)?;
    arg(out, ARG_BUILD_SHA256)?;
    writeln!(out)?;

    if runtime == Runtime::Php {
        writeln!(out, "ENV {0}=${{{0}}}", ARG_PHP_VERSION)?;
    }
    writeln!(out, "ENV {0}=${{{0}}}", ARG_TZ)?;

    let ports = runtime
        .exposed_ports()
        .iter()
        .map(|port| port.to_string())
        .collect::<Vec<_>>();
    writeln!(out, "EXPOSE {}", ports.join(" "))?;
    writeln!(out, "WORKDIR /{}", Layout::APP_DIR)?;
    writeln!(out)?;
    writeln!(out, "CMD [\"bash\", \"{}\"]", ENTRYPOINT_SCRIPT)?;
    writeln!(out)?;

    let in_image = format!("/{}", Layout::BUILD_SCRIPT);
    let in_context = format!("/src/{}/{}", Layout::OVERLAY_DIR, Layout::BUILD_SCRIPT);
    let lines = [
        "set -xe".to_string(),
        format!(
            "if [ \"${}\" = true ] || [ \"${}\" = true ]; then",
            ARG_CHANGE_SOURCE, ARG_IN_CHINA
        ),
        format!(
            "    sed -i 's/{}/{}/g' /{}",
            sed_pattern(&mirror.from),
            sed_replacement(&mirror.to),
            Layout::SOURCE_LIST
        ),
        "fi".to_string(),
        format!("if [ -f {0} ]; then", in_image),
        format!("    bash {}", in_image),
        format!("elif [ -f {0} ]; then", in_context),
        format!("    bash {}", in_context),
        "else".to_string(),
        format!("    curl -fLo /tmp/build.sh \"${}\"", ARG_BUILD_URL),
        format!(
            "    if [ -n \"${0}\" ]; then echo \"${0}  /tmp/build.sh\" | sha256sum -c -; fi",
            ARG_BUILD_SHA256
        ),
        "    bash /tmp/build.sh".to_string(),
        "    rm -f /tmp/build.sh".to_string(),
        "fi".to_string(),
    ];

    writeln!(out, "RUN --mount=type=bind,target=/src,rw \\")?;
    for (index, line) in lines.iter().enumerate() {
        let terminator = match line.as_str() {
            _ if index + 1 == lines.len() => "",
            "else" => " \\",
            _ if line.ends_with("then") => " \\",
            _ => "; \\",
        };
        writeln!(out, "    {}{}", line, terminator)?;
    }
    writeln!(out)?;

    writeln!(out, "COPY ./{}/ /", Layout::OVERLAY_DIR)?;
    writeln!(out)?;
    writeln!(out, "ONBUILD COPY ./{}/ /", Layout::OVERLAY_DIR)?;
    writeln!(
        out,
        "ONBUILD RUN if [ -f /{0} ]; then bash /{0}; else :; fi",
        Layout::ONBUILD_SCRIPT
    )?;

    Ok(())
}

/// Escapes `text` so a `sed` regex matches it literally.
fn sed_pattern(text: &str) -> String {
    sed_escape(text, &['\\', '/', '.', '*', '[', ']', '^', '$'])
}

/// Escapes `text` so a `sed` replacement inserts it literally.
fn sed_replacement(text: &str) -> String {
    sed_escape(text, &['\\', '/', '&'])
}

fn sed_escape(text: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => escaped.push_str("'\\''"),
            c if special.contains(&c) => {
                escaped.push('\\');
                escaped.push(c);
            }
            c => escaped.push(c),
        }
    }
    escaped
}
