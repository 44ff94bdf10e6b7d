use env_logger::{Builder, Env};
use log::kv::{Error, Key, Value, VisitSource};
use std::fmt::Write as _;
use std::io::Write;

/// `timestamp: LEVEL: message key=value ...`, level from `RUST_LOG` (default info).
pub fn start_log() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let mut fields = String::new();
            let _ = record.key_values().visit(&mut FieldWriter(&mut fields));
            writeln!(
                buf,
                "{}: {}: {}{}",
                buf.timestamp(),
                record.level(),
                record.args(),
                fields
            )
        })
        .init();
}

struct FieldWriter<'a>(&'a mut String);

impl<'kvs> VisitSource<'kvs> for FieldWriter<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), Error> {
        write!(self.0, " {}={}", key, value).map_err(|_| Error::msg("failed to format field"))
    }
}
