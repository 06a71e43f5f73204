use crate::args;
use crate::errors::*;

/// Reserved: `spec.md` §6 lists this subcommand but defines no behavior
/// for it yet.
pub async fn run(_args: &args::Create) -> Result<()> {
    eprintln!("create: not yet implemented");
    std::process::exit(1);
}
