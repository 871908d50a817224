//! Tune command: the outer generation loop.

use crate::config::SessionConfig;
use crate::status::{self, StatusSnapshot};
use crate::target::CommandTargetFactory;
use crate::Result;
use clap::Args;
use paramrace_core::{
    EventSink, Instance, MeanQualityEvaluator, PenalizedRuntimeEvaluator, RankedGenome,
    RunEvaluator, TunerEvent, TuningObjective,
};
use paramrace_engine::LocalDeployment;
use paramrace_genetics::{GeneticOperators, Population};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct TuneArgs {
    /// Session configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the configured generation count
    #[arg(short, long)]
    pub generations: Option<u64>,
}

pub async fn execute(args: TuneArgs) -> Result<()> {
    let mut session = SessionConfig::load(&args.config)?;
    if let Some(generations) = args.generations {
        session.tuner.generations = generations;
    }
    session.validate()?;

    let base = args
        .config
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let space = session.build_space()?;
    let instances = session.load_instances(&base)?;
    let status_path = session.status_path(&base);

    info!(
        generations = session.tuner.generations,
        parameters = space.len(),
        instances = instances.len(),
        "starting tuning session"
    );
    run_session(session, space, instances, status_path).await
}

async fn run_session(
    session: SessionConfig,
    space: paramrace_core::ParamSpace,
    instances: Vec<Instance>,
    status_path: Option<PathBuf>,
) -> Result<()> {
    let tuner = &session.tuner;
    let evaluator: Arc<dyn RunEvaluator> = match tuner.objective {
        TuningObjective::Runtime => Arc::new(PenalizedRuntimeEvaluator::new(tuner.timeout_penalty)),
        TuningObjective::Quality => Arc::new(MeanQualityEvaluator),
    };

    let events = EventSink::default();
    let factory = CommandTargetFactory::new(session.target.clone());
    let deployment =
        LocalDeployment::start(tuner.engine.clone(), &factory, evaluator, events.clone()).await?;

    let mut operators =
        GeneticOperators::new(space, tuner.genetics.mutation_rate, tuner.genetics.seed);
    let mut population = Population::seed(&tuner.genetics, &mut operators);
    let mut incumbent: Option<RankedGenome> = None;

    for generation in 1..=tuner.generations {
        let outcome = deployment
            .select(population.competitive().to_vec(), instances.clone(), generation)
            .await?;

        if let Some(best) = outcome.best() {
            let improved = incumbent
                .as_ref()
                .map(|current| best.score < current.score)
                .unwrap_or(true);
            if improved {
                info!(generation, score = best.score, "new incumbent");
                incumbent = Some(best.clone());
            }
        }
        info!(
            generation,
            of = tuner.generations,
            winners = outcome.winners.len(),
            best = incumbent.as_ref().map(|i| i.score),
            "generation complete"
        );
        events.emit(TunerEvent::GenerationComplete {
            generation,
            best_score: incumbent
                .as_ref()
                .map(|i| i.score)
                .unwrap_or(f64::INFINITY),
            winners: outcome.winners.len(),
        });

        population.next_generation(&outcome.winner_genomes(), &mut operators);

        if let Some(path) = &status_path {
            let snapshot = StatusSnapshot::capture(
                generation,
                tuner.generations,
                incumbent.as_ref(),
                &population,
            );
            status::write_snapshot(path, &snapshot)?;
        }
    }
    deployment.shutdown().await?;

    match &incumbent {
        Some(best) => {
            println!("Best configuration found (score {:.4}):", best.score);
            for (name, value) in best.genome.alleles() {
                println!("  {name} = {value}");
            }
        }
        None => println!("No configuration finished evaluation."),
    }
    Ok(())
}
