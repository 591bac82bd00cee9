mod http;
mod shell;

pub use http::HttpFetcher;
pub use shell::ShellRunner;
