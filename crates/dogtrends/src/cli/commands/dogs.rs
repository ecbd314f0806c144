use anyhow::Result;
use clap::Args;

use super::analysis::{envelope_failure, load, ok_envelope, print_envelope};
use crate::config::RuntimePaths;
use crate::exclusion::{RegionFilter, dog_counts, valid_dog_set};
use crate::models::WarningCode;
use crate::reporter::render_dog_counts;

#[derive(Debug, Clone, Args)]
pub struct DogsArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

pub fn run(args: &DogsArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    if !args.json {
        println!("dogs: start db={}", runtime_paths.database.display());
    }

    let result = load(runtime_paths).map(|(_, snapshot)| {
        let orphan_dogs =
            valid_dog_set(&snapshot.users, &snapshot.dogs, &RegionFilter::any()).orphan_dogs();
        (dog_counts(&snapshot.users, &snapshot.dogs), orphan_dogs)
    });

    if args.json {
        let (counts, orphan_dogs) = result.map_err(|error| envelope_failure("dogs", &error))?;
        let mut envelope = ok_envelope("dogs", &counts, runtime_paths)?;
        if orphan_dogs > 0 {
            envelope = envelope.with_warning(
                WarningCode::OrphanDogs,
                format!("{orphan_dogs} dog row(s) reference a user_guid with no users row"),
            );
        }
        return print_envelope(&envelope);
    }

    let (counts, orphan_dogs) = result?;
    println!("dogs: orphan_dogs={orphan_dogs}");
    println!("{}", render_dog_counts(&counts));
    Ok(())
}
