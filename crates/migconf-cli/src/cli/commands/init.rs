use super::{exit_codes, AppContext};
use crate::cli::args::{GlobalArgs, InitArgs};
use migconf_core::config::{write_sample_config, write_sample_template};

pub fn run(global: &GlobalArgs, args: InitArgs) -> anyhow::Result<i32> {
    if global.config.exists() && !args.force {
        println!("ℹ️  {} already exists, keeping it", global.config.display());
    } else {
        write_sample_config(&global.config)?;
        println!("✅ Created {}", global.config.display());
    }

    if args.template.exists() && !args.force {
        println!("ℹ️  {} already exists, keeping it", args.template.display());
    } else {
        write_sample_template(&args.template)?;
        println!("✅ Created {}", args.template.display());
    }

    let ctx = AppContext::open(global)?;
    println!("✅ Database ready at {}", ctx.cfg.db_path().display());
    println!(
        "Next: migconf template import --file {}",
        args.template.display()
    );
    Ok(exit_codes::OK)
}
