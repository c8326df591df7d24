use super::{exit_codes, AppContext};
use crate::cli::args::{ConnectionArgs, ConnectionSub, GlobalArgs};
use anyhow::Context;
use migconf_core::model::{ConnectionKind, DbConnection};

pub fn run(global: &GlobalArgs, args: ConnectionArgs) -> anyhow::Result<i32> {
    let ctx = AppContext::open(global)?;
    match args.cmd {
        ConnectionSub::Add(a) => {
            let path = std::fs::canonicalize(&a.path)
                .with_context(|| format!("target database not found: {}", a.path.display()))?;
            let conn = DbConnection {
                id: a.id.clone(),
                name: if a.name.is_empty() { a.id.clone() } else { a.name },
                kind: ConnectionKind::Sqlite,
                path: path.to_string_lossy().into_owned(),
            };
            ctx.store.save_connection(&conn)?;
            println!("✅ Connection '{}' -> {}", conn.id, conn.path);
        }
        ConnectionSub::List => {
            for c in ctx.store.list_connections()? {
                println!("{:<16} {:<24} {}", c.id, c.name, c.path);
            }
        }
    }
    Ok(exit_codes::OK)
}
