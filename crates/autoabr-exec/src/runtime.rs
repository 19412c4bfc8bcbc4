//! Ladder analysis: candidate pairs through a backend into per-model ladders.
//!
//! Flow per run:
//! - Generate candidate pairs from the search space.
//! - Per pair: transcode (or locate the variant), then measure every model.
//! - Gather all pair outcomes, then fold them into per-model artifact lists.
//! - Load the artifacts and select one ladder per model.
//! - Emit an `AnalysisReport` with a `RunManifest`.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoabr_core::config::EngineConfig;
use autoabr_core::manifest::{now_ms, RunManifest};
use autoabr_core::naming::{join, quality_file_name, variant_file_name};
use autoabr_core::{CandidatePair, LadderRung, QualityModel};
use autoabr_io::readers::load_artifacts;
use autoabr_ladder::{select_ladder, verify, LadderPolicy, SelectionMode};
use autoabr_planner::{ResolvedJob, SearchSpace};
use serde::Serialize;
use tracing::{error, info, warn, Instrument};

use crate::backend::ExecutionBackend;
use crate::error::{ExecError, Result};
use crate::metrics;
use crate::scheduler::{run_all, FanOut};

/// What to analyse; usually built from a resolved job description.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Artifact directory (job name).
    pub name: String,
    pub reference: String,
    pub models: Vec<QualityModel>,
    pub search: SearchSpace,
    pub concurrency: bool,
    pub skip_transcode: bool,
    pub selection: SelectionMode,
    pub policy: LadderPolicy,
}

impl AnalysisRequest {
    pub fn from_job(job: &ResolvedJob) -> Self {
        Self {
            name: job.name.clone(),
            reference: job.reference.clone(),
            models: job.models.clone(),
            search: job.search.clone(),
            concurrency: job.concurrency,
            skip_transcode: job.skip_transcode,
            selection: if job.include_all_bitrates {
                SelectionMode::IncludeAll
            } else {
                SelectionMode::Pruned
            },
            policy: LadderPolicy::default(),
        }
    }

    /// Pairs and the artifact locations a run would use, without running anything.
    pub fn plan(&self) -> Vec<PlannedPair> {
        self.search
            .pairs()
            .into_iter()
            .map(|pair| {
                let variant = join(&self.name, &variant_file_name(&pair.stem()));
                let quality = self
                    .models
                    .iter()
                    .map(|&model| (model, quality_location(&self.name, model, &variant)))
                    .collect();
                PlannedPair { pair, variant, quality }
            })
            .collect()
    }
}

/// Deterministic artifact locations for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedPair {
    pub pair: CandidatePair,
    pub variant: String,
    pub quality: Vec<(QualityModel, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    pub pair: CandidatePair,
    /// `transcode` or the model whose analysis failed.
    pub stage: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelLadder {
    pub model: QualityModel,
    /// Result artifacts produced for this model.
    pub artifacts: Vec<String>,
    /// Artifacts that could not be parsed.
    pub rejected: Vec<String>,
    pub ladder: Vec<LadderRung>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub manifest: RunManifest,
    pub ladders: Vec<ModelLadder>,
    pub failures: Vec<PairFailure>,
}

impl AnalysisReport {
    pub fn ladder(&self, model: QualityModel) -> Option<&[LadderRung]> {
        self.ladders
            .iter()
            .find(|l| l.model == model)
            .map(|l| l.ladder.as_slice())
    }
}

#[derive(Debug, Default)]
struct PairOutcome {
    produced: Vec<(QualityModel, String)>,
    failures: Vec<PairFailure>,
}

/// Drives one backend through a full ladder analysis.
pub struct Analyzer {
    backend: Arc<dyn ExecutionBackend>,
    cfg: EngineConfig,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn ExecutionBackend>, cfg: EngineConfig) -> Self {
        Self { backend, cfg }
    }

    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        request.policy.validate()?;
        let search_hash = request.search.digest().map_err(|e| ExecError::Hash(e.to_string()))?;
        let started = now_ms();

        let reference = self.backend.prepare_reference(&request.reference, &request.name).await?;
        let manifest = RunManifest::new(&request.name, &reference, search_hash, started);

        let planned = request.plan();
        if planned.is_empty() {
            warn!(job = %request.name, "no candidate pairs survive filtering; nothing to analyse");
        }
        let total = planned.len();
        info!(
            job = %request.name,
            backend = self.backend.name(),
            pairs = total,
            models = request.models.len(),
            "analysis started"
        );

        let fan_out = FanOut::from_flags(request.concurrency, self.cfg.max_parallel_pairs);
        let reference = reference.as_str();
        let outcomes = run_all(planned, fan_out, move |planned| self.analyze_pair(request, reference, planned)).await;
        if let Err(e) = self.backend.finish().await {
            warn!(backend = self.backend.name(), error = %e, "backend cleanup failed");
        }

        let mut by_model: BTreeMap<QualityModel, Vec<String>> = BTreeMap::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            for (model, location) in outcome.produced {
                by_model.entry(model).or_default().push(location);
            }
            failures.extend(outcome.failures);
        }

        let store = self.backend.artifact_store();
        let mut ladders = Vec::with_capacity(request.models.len());
        for &model in &request.models {
            let artifacts = by_model.remove(&model).unwrap_or_default();
            let loaded = load_artifacts(&*store, &artifacts).await?;
            let ladder = select_ladder(&loaded.results, &request.policy, request.selection);
            for (upper, lower) in verify::score_inversions(&ladder) {
                warn!(
                    model = model.as_str(),
                    bitrate = upper.bitrate,
                    vmaf = upper.vmaf,
                    below_bitrate = lower.bitrate,
                    below_vmaf = lower.vmaf,
                    "ladder score decreases with bitrate"
                );
            }
            info!(model = model.as_str(), results = loaded.results.len(), rungs = ladder.len(), "ladder selected");
            ladders.push(ModelLadder {
                model,
                artifacts,
                rejected: loaded.rejected,
                ladder,
            });
        }

        let failed_pairs = {
            let mut pairs: Vec<&CandidatePair> = failures.iter().map(|f| &f.pair).collect();
            pairs.dedup();
            pairs.len()
        };
        let manifest = manifest.finish(now_ms(), total, failed_pairs);
        metrics::emit_event(
            "analysis_finished",
            &[
                ("job", request.name.clone()),
                ("pairs", total.to_string()),
                ("failed_pairs", failed_pairs.to_string()),
                ("elapsed_ms", manifest.finished_ms.saturating_sub(manifest.started_ms).to_string()),
            ],
        );

        Ok(AnalysisReport {
            manifest,
            ladders,
            failures,
        })
    }

    async fn analyze_pair(&self, request: &AnalysisRequest, reference: &str, planned: PlannedPair) -> PairOutcome {
        let span = metrics::pair_span(&planned.pair);
        async move {
            let PlannedPair { pair, variant, quality } = planned;
            let mut outcome = PairOutcome::default();

            let produced = if request.skip_transcode {
                Ok(Some(self.backend.variant_location(&variant)))
            } else {
                self.backend
                    .transcode(reference, pair.resolution, pair.bitrate, &variant, &pair.variables)
                    .await
            };
            let distorted = match produced {
                Ok(Some(location)) => location,
                Ok(None) => {
                    error!("transcode produced no variant; pair skipped");
                    outcome.failures.push(failure(&pair, "transcode", "no variant produced".into()));
                    return outcome;
                }
                Err(e) => {
                    error!(error = %e, "transcode failed; pair skipped");
                    outcome.failures.push(failure(&pair, "transcode", e.to_string()));
                    return outcome;
                }
            };

            let fan_out = FanOut::from_flags(request.concurrency, None);
            let distorted = distorted.as_str();
            let results = run_all(quality, fan_out, move |(model, output)| async move {
                let result = self.backend.analyze_quality(reference, distorted, &output, model).await;
                (model, result)
            })
            .await;

            for (model, result) in results {
                match result {
                    Ok(Some(location)) => outcome.produced.push((model, location)),
                    Ok(None) => {
                        error!(model = model.as_str(), "quality analysis produced no result");
                        outcome.failures.push(failure(&pair, model.as_str(), "no result produced".into()));
                    }
                    Err(e) => {
                        error!(model = model.as_str(), error = %e, "quality analysis failed");
                        outcome.failures.push(failure(&pair, model.as_str(), e.to_string()));
                    }
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

fn failure(pair: &CandidatePair, stage: &str, reason: String) -> PairFailure {
    PairFailure {
        pair: pair.clone(),
        stage: stage.to_string(),
        reason,
    }
}

/// `{job}/{model}/{stem}_vmaf.json` for the requested variant location.
pub fn quality_location(job: &str, model: QualityModel, variant: &str) -> String {
    join(&join(job, model.as_str()), &quality_file_name(variant))
}
