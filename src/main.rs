use std::{collections::BTreeMap, error::Error, path::PathBuf};

use log::{error, info};
use rsp::{
    config::ReschedulingConfig,
    debug::{log_problem, problem_statistics},
    evaluation::verify_schedule,
    generators::{
        reschedule_delta::delta_reschedule_problem_description,
        reschedule_full::full_reschedule_problem_description,
        schedule::schedule_problem_description, ScheduleProblemDescription,
    },
    occupation::{extract_resource_occupations, ResourceConflict, ResourceOccupation},
    parser::{read_instance, read_trainruns, Instance},
    problem::VehicleId,
};
use serde::Serialize;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "rsp")]
struct Opt {
    /// JSON file with rescheduling parameters
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Overrides the release time of the configuration
    #[structopt(long)]
    release_time: Option<i32>,

    /// Print per-vehicle constraint statistics instead of the problem
    #[structopt(long)]
    stats: bool,

    /// Print profiling timings after the output
    #[structopt(long)]
    profile: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Constraints of the undisrupted scheduling problem
    Schedule {
        #[structopt(name = "INSTANCE", parse(from_os_str))]
        instance: PathBuf,
    },
    /// Constraints after the instance's malfunction
    Full {
        #[structopt(name = "INSTANCE", parse(from_os_str))]
        instance: PathBuf,
    },
    /// Constraints of the delta reschedule, given the full reschedule
    Delta {
        #[structopt(name = "INSTANCE", parse(from_os_str))]
        instance: PathBuf,
    },
    /// Resource occupations and conflicts of the instance's schedule
    Occupations {
        #[structopt(name = "INSTANCE", parse(from_os_str))]
        instance: PathBuf,
    },
    /// Check trainruns against one of the instance's problems
    Verify {
        #[structopt(name = "INSTANCE", parse(from_os_str))]
        instance: PathBuf,
        #[structopt(name = "TRAINRUNS", parse(from_os_str))]
        trainruns: PathBuf,
        /// schedule, full or delta
        #[structopt(long, default_value = "schedule")]
        stage: String,
    },
}

#[derive(Serialize)]
struct OccupationsOutput<'a> {
    per_vehicle: &'a BTreeMap<VehicleId, Vec<ResourceOccupation>>,
    conflicts: Vec<ResourceConflict>,
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_problem(opt: &Opt, problem: &ScheduleProblemDescription) -> Result<(), Box<dyn Error>> {
    log_problem(problem);
    if opt.stats {
        print_json(&problem_statistics(problem))
    } else {
        print_json(problem)
    }
}

fn load(path: &PathBuf) -> Result<Instance, Box<dyn Error>> {
    Ok(read_instance(&path.to_string_lossy())?)
}

fn problem_for_stage(
    stage: &str,
    instance: &Instance,
    config: &ReschedulingConfig,
) -> Result<ScheduleProblemDescription, Box<dyn Error>> {
    let infrastructure = &instance.infrastructure;
    Ok(match stage {
        "schedule" => schedule_problem_description(infrastructure, config),
        "full" => full_reschedule_problem_description(
            infrastructure,
            instance.schedule()?,
            instance.malfunction()?,
            config,
        ),
        "delta" => {
            delta_reschedule_problem_description(
                infrastructure,
                instance.schedule()?,
                instance.full_reschedule()?,
                instance.malfunction()?,
                config,
            )
            .problem
        }
        other => return Err(format!("unknown stage {}", other).into()),
    })
}

fn run(opt: &Opt) -> Result<bool, Box<dyn Error>> {
    let mut config = match &opt.config {
        Some(path) => ReschedulingConfig::from_file(&path.to_string_lossy())?,
        None => ReschedulingConfig::default(),
    };
    if let Some(release_time) = opt.release_time {
        config.release_time = release_time;
        config.validate()?;
    }
    info!("{:?}", config);

    match &opt.command {
        Command::Schedule { instance } => {
            let instance = load(instance)?;
            print_problem(opt, &problem_for_stage("schedule", &instance, &config)?)?;
        }
        Command::Full { instance } => {
            let instance = load(instance)?;
            print_problem(opt, &problem_for_stage("full", &instance, &config)?)?;
        }
        Command::Delta { instance } => {
            let instance = load(instance)?;
            let delta = delta_reschedule_problem_description(
                &instance.infrastructure,
                instance.schedule()?,
                instance.full_reschedule()?,
                instance.malfunction()?,
                &config,
            );
            log_problem(&delta.problem);
            if opt.stats {
                print_json(&problem_statistics(&delta.problem))?;
            } else {
                print_json(&delta)?;
            }
        }
        Command::Occupations { instance } => {
            let instance = load(instance)?;
            let occupations = extract_resource_occupations(instance.schedule()?, config.release_time);
            print_json(&OccupationsOutput {
                per_vehicle: &occupations.per_vehicle,
                conflicts: occupations.conflicts(),
            })?;
        }
        Command::Verify {
            instance,
            trainruns,
            stage,
        } => {
            let instance = load(instance)?;
            let trainruns = read_trainruns(&trainruns.to_string_lossy())?;
            let problem = problem_for_stage(stage, &instance, &config)?;
            let violations = verify_schedule(&problem, &trainruns, config.release_time);
            print_json(&violations)?;
            return Ok(violations.is_empty());
        }
    }
    Ok(true)
}

pub fn main() {
    pretty_env_logger::init();
    let opt = Opt::from_args();
    hprof::start_frame();

    let ok = match run(&opt) {
        Ok(ok) => ok,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            false
        }
    };

    hprof::end_frame();
    if opt.profile {
        hprof::profiler().print_timing();
    }
    if !ok {
        std::process::exit(1);
    }
}
