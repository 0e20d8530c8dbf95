use anyhow::Context;
use clap::Parser;
use road_cost_common::prefilter::{EmbeddingIndex, HashingEmbedder};
use road_cost_common::unit::unit_from_code;
use road_cost_common::{BatchSummary, CancelFlag, CostingEngine};
use road_cost_rust::{batch, cli, config, export, loader, logging};
use cli::{Cli, Commands};
use config::Config;
use std::collections::BTreeMap;
use std::path::PathBuf;

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn load_engine(config: &Config) -> anyhow::Result<CostingEngine> {
    let snapshot = loader::load_snapshot_cancellable(config.clone(), CancelFlag::new())
        .await
        .context("データの読み込みに失敗しました")?;
    for warning in snapshot.load_warnings() {
        tracing::warn!("{}", warning);
    }
    Ok(CostingEngine::new(snapshot))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("設定ファイルを読み込めません: {}", config_path.display()))?;

    if let Some(path) = &cli.rulebook {
        config.rulebook_path = path.clone();
    }
    if let Some(path) = &cli.installation {
        config.installation_path = path.clone();
    }
    if let Some(path) = &cli.catalog {
        config.catalog_path = path.clone();
    }
    if let Some(path) = &cli.index {
        config.index_path = Some(path.clone());
    }
    if let Some(k) = cli.top_k {
        config.prefilter_top_k = k;
    }

    match cli.command {
        Commands::Estimate { intervention_type, params } => {
            let engine = load_engine(&config).await?;
            let params: BTreeMap<String, f64> = params.into_iter().collect();
            match engine.estimate(&intervention_type, &params) {
                Ok(estimate) => {
                    for warning in &estimate.warnings {
                        tracing::warn!("{}", warning);
                    }
                    print_json(&estimate)?;
                }
                Err(error) => {
                    print_json(&error)?;
                    anyhow::bail!(error);
                }
            }
        }

        Commands::Match { description, qty, unit } => {
            let engine = load_engine(&config).await?;
            let unit = unit.or_else(|| unit_from_code(&description));
            let result = engine.match_material(&description, qty, unit.as_deref());
            print_json(&result)?;
        }

        Commands::Cost { input } => {
            let (intervention_type, materials) = batch::load_estimation(&input)?;
            let engine = load_engine(&config).await?;
            let breakdown = engine.calculate_costs(&materials, &intervention_type);
            print_json(&breakdown)?;
        }

        Commands::Run { input, output, format, title } => {
            println!("🚧 road-cost - 一括積算\n");

            println!("[1/3] データを読み込み中...");
            let interventions = batch::load_interventions(&input)?;
            let engine = load_engine(&config).await?;
            println!(
                "✔ {}件の対策、単価表{}件\n",
                interventions.len(),
                engine.snapshot().matcher().catalog().len()
            );

            println!("[2/3] 積算中...");
            let outcome = batch::run_batch(engine, interventions, CancelFlag::new()).await?;
            let summary = BatchSummary::compute(&outcome);
            if outcome.was_cancelled() {
                println!("⚠ 中断しました（未処理 {}件）", outcome.cancelled_count());
            }
            println!(
                "✔ {}件 / 失敗 {}件 / 合計 {:.2}\n",
                summary.kpis.total_interventions,
                summary.kpis.failed_interventions,
                summary.kpis.grand_total
            );

            println!("[3/3] 出力中...");
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
            export::export_outcome(&outcome, &summary, &format, &output_dir, &title)?;

            println!("\n✅ 完了");
        }

        Commands::Check => {
            println!("🔍 road-cost - データ検証\n");
            let engine = load_engine(&config).await?;
            let snapshot = engine.snapshot();

            let rulebook = snapshot.rulebook();
            println!("ルールブック: {} ({}種別)", config.rulebook_path.display(), rulebook.len());
            let compile_errors = rulebook.compile_errors();
            for (intervention_type, code, error) in &compile_errors {
                println!("  ✘ {}.{}: {}", intervention_type, code, error);
            }

            println!(
                "据付費表: {} ({}件)",
                config.installation_path.display(),
                snapshot.installation().len()
            );
            for intervention_type in rulebook.intervention_types() {
                if snapshot.installation().lookup(intervention_type).is_none() {
                    println!("  ⚠ 据付費なし: {}", intervention_type);
                }
            }

            match snapshot.matcher().catalog().catalog() {
                Some(catalog) => println!(
                    "単価表: {} ({}件、単価なし{}件)",
                    config.catalog_path.display(),
                    catalog.len(),
                    catalog.missing_rate_count()
                ),
                None => println!("単価表: 利用不可 ({})", config.catalog_path.display()),
            }
            println!(
                "候補生成: {}",
                if snapshot.matcher().uses_prefilter() { "ベクトル前段絞り込み" } else { "全件走査" }
            );

            for warning in snapshot.load_warnings() {
                println!("  ⚠ {}", warning);
            }
            println!("フィンガープリント: {}", snapshot.fingerprint());

            if compile_errors.is_empty() {
                println!("\n✅ 検証完了");
            } else {
                println!("\n⚠ 数量式エラー {}件", compile_errors.len());
            }
        }

        Commands::Index { output, dim } => {
            let dim = dim.unwrap_or(config.embedding_dim);
            println!("- 単価表を読み込み中...");
            let (catalog, _) = loader::load_catalog(&config.catalog_path)?;
            let embedder = HashingEmbedder::new(dim);
            let index = EmbeddingIndex::build(&catalog, &embedder);
            std::fs::write(&output, index.to_json()?)?;
            println!("✔ インデックス出力: {} ({}件, {}次元)", output.display(), index.len(), dim);

            if dim != config.embedding_dim {
                println!("  ※ 設定の embedding_dim ({}) と異なります", config.embedding_dim);
            }
        }

        Commands::Config {
            show,
            set_rulebook,
            set_installation,
            set_catalog,
            set_index,
            set_top_k,
            set_min_score,
        } => {
            let mut stored = Config::load_from(&config_path)?;
            let mut changed = false;

            if let Some(path) = set_rulebook {
                stored.rulebook_path = path;
                changed = true;
            }
            if let Some(path) = set_installation {
                stored.installation_path = path;
                changed = true;
            }
            if let Some(path) = set_catalog {
                stored.catalog_path = path;
                changed = true;
            }
            if let Some(path) = set_index {
                stored.index_path = Some(path);
                changed = true;
            }
            if let Some(k) = set_top_k {
                stored.prefilter_top_k = k;
                changed = true;
            }
            if let Some(score) = set_min_score {
                stored.min_combined_score = score;
                changed = true;
            }

            if changed {
                stored.save_to(&config_path)?;
                println!("✔ 設定を保存しました: {}", config_path.display());
            }

            if show || !changed {
                println!("設定:");
                println!("  ルールブック: {}", stored.rulebook_path.display());
                println!("  据付費表: {}", stored.installation_path.display());
                println!("  単価表: {}", stored.catalog_path.display());
                println!(
                    "  埋め込みインデックス: {}",
                    stored.index_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "未設定".into())
                );
                println!("  前段絞り込み件数: {}", stored.prefilter_top_k);
                println!("  埋め込み次元: {}", stored.embedding_dim);
                println!("  候補数: {}", stored.candidate_limit);
                println!("  最低スコア: {}", stored.min_combined_score);
            }
        }
    }

    Ok(())
}

