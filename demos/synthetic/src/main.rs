#[macro_use]
extern crate log;

use std::time::Instant;

use common::{FoldScheme, Params, Result};
use cross_validation::{
    p_values, Analysis, CrossValidation, FoldOrderings, JsonStore, PermutationTables,
    StimulusFeatures, StimulusTable, SubjectRecordings, Trial, R2_ALL,
};
use dialoguer::{theme::ColorfulTheme, Select};
use nalgebra::DMatrix;
use nanorand::{Rng, WyRand};

const NUM_STIMULI: usize = 60;
const NUM_CHANNELS: usize = 8;
const SEED: u64 = 0;

pub(crate) fn main() {
    pretty_env_logger::init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut params = match std::env::args().nth(1) {
        Some(path) => Params::from_json_file(path)?,
        None => Params {
            num_permutations: 5,
            ..Default::default()
        },
    };

    let analyses = vec!["absolute vs. relative pitch", "relative pitch vs. pitch change"];
    let analysis = match Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select analysis")
        .items(&analyses)
        .default(0)
        .interact()
        .unwrap_or(0)
    {
        0 => Analysis::AbsVersusRel,
        _ => Analysis::RelVersusChange,
    };
    let schemes = vec!["stratified", "5-fold"];
    let e = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select fold scheme")
        .items(&schemes)
        .default(0)
        .interact()
        .unwrap_or(0);
    if e == 1 {
        params.fold_scheme = FoldScheme::KFold { k: 5 };
    }

    let (recordings, table) = synthetic_subject(params.sample_rate, params.response_offset)?;
    info!(
        "generated {} stimuli and {} channels for {}",
        table.len(),
        recordings.num_channels(),
        recordings.subject()
    );
    let orderings = stratified_orderings(&recordings, params.fold_scheme.num_folds());
    let tables = PermutationTables::generate(&table, params.num_permutations, params.seed)?;
    let store = JsonStore::new(params.result_root.clone());

    let edges = table.fit_encoding(&params)?;
    let cv = CrossValidation::new(params, edges)?;

    let t0 = Instant::now();
    let outcome = cv.run_and_save(analysis, &recordings, &table, &orderings, &store)?;
    info!("{} done in {}ms", analysis, t0.elapsed().as_millis());

    let t0 = Instant::now();
    let null = cv.permutation_test_and_save(analysis, &recordings, &tables, &orderings, &store)?;
    info!("permutation test done in {}ms", t0.elapsed().as_millis());

    let full = outcome.full();
    let observed = full.mean_squared_correlation();
    if let Some(r2_all) = null.get(R2_ALL) {
        for (chan, p) in p_values(&observed, r2_all)?.iter().enumerate() {
            info!("channel {}: r2_all: {:.4}, p: {:.2}", chan, observed[chan], p);
        }
    }
    for (name, values) in outcome.contrasts() {
        info!("{}: {:?}", name, values);
    }
    info!("results written to {:?}", store.root());

    Ok(())
}

/// Channels respond to either the relative pitch, the absolute pitch or the
/// pitch change of sentences spoken by three speakers
fn synthetic_subject(
    sample_rate: f64,
    response_offset: usize,
) -> Result<(SubjectRecordings, StimulusTable)> {
    let mut rng = WyRand::new_seed(SEED);
    let mut table = StimulusTable::new();
    let mut trials = Vec::with_capacity(NUM_STIMULI);
    for s in 0..NUM_STIMULI {
        let n = (sample_rate * (1.0 + rng.generate::<f64>())) as usize;
        let speaker = (s % 3) as f64 - 1.0;
        let phase = rng.generate::<f64>() * 6.0;
        let rel: Vec<f64> = (0..n).map(|i| (phase + i as f64 * 4.0 / sample_rate).sin()).collect();
        let abs: Vec<f64> = rel.iter().map(|r| 0.6 * r + speaker).collect();
        let change: Vec<f64> = (0..n).map(|i| if i == 0 { 0.0 } else { abs[i] - abs[i - 1] }).collect();
        let intensity: Vec<f64> = (0..n).map(|i| (i as f64 / sample_rate * 8.0).cos()).collect();

        let mut reps = Vec::with_capacity(2);
        for _ in 0..2 {
            let mut rec: DMatrix<f64> = DMatrix::zeros(NUM_CHANNELS, n + response_offset + 1);
            for i in 0..n {
                for c in 0..NUM_CHANNELS {
                    let drive = match c % 3 {
                        0 => rel[i],
                        1 => abs[i],
                        _ => change[i] * 20.0,
                    };
                    rec[(c, i + 1 + response_offset)] = drive + 0.5 * (rng.generate::<f64>() - 0.5);
                }
            }
            reps.push(rec);
        }

        let id = format!("sentence{s:03}");
        table.insert(id.clone(), StimulusFeatures::new(abs, rel, change, intensity)?);
        trials.push(Trial {
            stimulus_id: id,
            repetitions: reps,
        });
    }

    Ok((SubjectRecordings::new("synthetic", trials)?, table))
}

/// Rotations of the recording order, one per fold
fn stratified_orderings(recordings: &SubjectRecordings, num_folds: usize) -> FoldOrderings {
    let ids = recordings.stimulus_ids();
    let step = (ids.len() / num_folds).max(1);
    FoldOrderings::new(
        (0..num_folds)
            .map(|f| {
                let mut ids = ids.to_vec();
                let len = ids.len();
                ids.rotate_left((f * step) % len);
                ids
            })
            .collect(),
    )
}
