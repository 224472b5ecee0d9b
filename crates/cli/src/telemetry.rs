//! Structured logging init (`spec.md` §6): `DEBUG=<scope,scope,...>` maps to
//! `tracing`'s `EnvFilter` directives at `debug` level for each named scope;
//! `DEBUG=1` enables `debug` for the whole `vargos` target group. With
//! neither set, the default level is `info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init(debug: Option<&str>) {
    let filter = EnvFilter::try_new(filter_directives(debug)).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();
}

/// Build the `EnvFilter` directive string for a `DEBUG` value, kept separate
/// from `EnvFilter` construction so the mapping is unit-testable as plain
/// string logic.
fn filter_directives(debug: Option<&str>) -> String {
    match debug {
        None | Some("") => "info".to_string(),
        Some("1") => "vargos=debug,info".to_string(),
        Some(scopes) => {
            let directives = scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|scope| format!("{scope}=debug"))
                .collect::<Vec<_>>()
                .join(",");
            format!("{directives},info")
        },
    }
}
