use super::{exit_codes, AppContext};
use crate::cli::args::{GlobalArgs, LinkArgs, LinkSub};
use chrono::Utc;
use migconf_core::errors::CoreError;
use migconf_core::link::{self, public_url};

pub fn run(global: &GlobalArgs, args: LinkArgs) -> anyhow::Result<i32> {
    let ctx = AppContext::open(global)?;
    match args.cmd {
        LinkSub::Regenerate(a) => {
            let grant = ctx.engine().regenerate_link(&a.id, Utc::now())?;
            println!("✅ New link for '{}'; the previous one no longer works", a.id);
            println!(
                "Link: {} (expires {})",
                public_url(&ctx.cfg.email.public_base_url, &grant.token),
                grant.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
            Ok(exit_codes::OK)
        }
        LinkSub::Resolve(a) => {
            let now = Utc::now();
            let resolved = if a.public {
                link::resolve_public(&ctx.store, &a.token, now)
            } else {
                link::resolve(&ctx.store, &a.token, now)
            };
            match resolved {
                Ok(conf) => {
                    println!("{} {}", conf.id, conf.status.as_str());
                    Ok(exit_codes::OK)
                }
                Err(
                    e @ (CoreError::LinkNotFound
                    | CoreError::LinkExpired
                    | CoreError::LinkUnavailable),
                ) => {
                    eprintln!("{}", e);
                    Ok(exit_codes::DIVERGENT)
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}
