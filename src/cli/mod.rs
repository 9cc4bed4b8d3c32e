use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

use matchcast::db::{
    create_pool, get_team_name, get_upcoming_fixtures, init_database, seed_demo_league, SeedOptions,
    SqliteMatchStore,
};
use matchcast::services::{FeatureEngineer, HybridPredictor, PoissonModel};
use matchcast::utils::probability_to_odds;
use matchcast::{PredictionResult, PredictorConfig, TeamId};

pub async fn init_db(config: &PredictorConfig) -> Result<()> {
    init_database(&config.database_url).await?;
    println!("✅ Database ready at {}", config.database_url);
    Ok(())
}

pub async fn seed(config: &PredictorConfig, teams: usize, seasons: u32, seed: u64) -> Result<()> {
    let pool = init_database(&config.database_url).await?;

    println!("🌱 Seeding demo league ({} teams, {} seasons)...", teams, seasons);

    let options = SeedOptions {
        teams,
        seasons,
        seed,
        anchor: Utc::now(),
    };
    match seed_demo_league(&pool, &options).await? {
        Some(summary) => {
            println!("✅ Seeded {} teams", summary.teams);
            println!("   Finished fixtures: {}", summary.finished_fixtures);
            println!("   Scheduled fixtures: {}", summary.scheduled_fixtures);
            println!("   Season snapshots: {}", summary.season_snapshots);
        }
        None => println!("📦 Database already has teams, nothing to do."),
    }

    Ok(())
}

pub async fn train(config: &PredictorConfig, save: Option<PathBuf>) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;
    let mut predictor = HybridPredictor::new(SqliteMatchStore::new(pool), config.clone());

    println!("🧠 Training on up to {} finished fixtures...", config.training_limit);

    let state = predictor.train().await?;
    println!("✅ Model trained!");
    println!("   Examples used: {}", state.examples_used);
    println!("   Trees: {}", state.forest.n_trees());
    println!("   Held-out accuracy: {:.1}%", state.test_accuracy * 100.0);

    if let Some(path) = save.or_else(|| config.model_path.clone()) {
        predictor.save_state(&path)?;
        println!("💾 Saved model to {}", path.display());
    }

    Ok(())
}

pub async fn predict(config: &PredictorConfig, home: TeamId, away: TeamId, model: Option<PathBuf>) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;
    let predictor = ready_predictor(&pool, config, model.as_deref()).await?;

    let home_name = team_label(&pool, home).await?;
    let away_name = team_label(&pool, away).await?;

    println!("🔮 {} vs {}", home_name, away_name);
    let prediction = predictor.predict_match(home, away).await?;
    print_prediction(&prediction);

    Ok(())
}

pub async fn upcoming(config: &PredictorConfig, model: Option<PathBuf>, limit: i64) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;

    let fixtures = get_upcoming_fixtures(&pool, limit).await?;
    if fixtures.is_empty() {
        println!("📭 No upcoming fixtures found. Try seeding first with: matchcast seed");
        return Ok(());
    }

    let predictor = ready_predictor(&pool, config, model.as_deref()).await?;

    println!("🔮 Predicting {} upcoming fixtures...\n", fixtures.len());
    let predictions = predictor.predict_upcoming(&fixtures).await?;

    for (i, (fixture, prediction)) in predictions.iter().enumerate() {
        println!(
            "{}. {} vs {} ({}):",
            i + 1,
            team_label(&pool, fixture.home_team_id).await?,
            team_label(&pool, fixture.away_team_id).await?,
            fixture.match_date.format("%Y-%m-%d %H:%M")
        );
        print_prediction(prediction);
        println!();
    }

    Ok(())
}

pub async fn form(config: &PredictorConfig, team: TeamId, opponent: Option<TeamId>) -> Result<()> {
    let pool = create_pool(&config.database_url).await?;
    let name = team_label(&pool, team).await?;
    let engineer = FeatureEngineer::with_windows(
        SqliteMatchStore::new(pool.clone()),
        config.form_window,
        config.h2h_window,
    );
    let n = engineer.form_window();

    println!("📊 Form for {} (last {} matches):", name, n);
    for (label, summary) in [
        ("Overall", engineer.team_form(team, n).await?),
        ("Home", engineer.home_away_form(team, true, n).await?),
        ("Away", engineer.home_away_form(team, false, n).await?),
    ] {
        println!(
            "   {:<8} {:>2} pts from {} | scored {:.2} | conceded {:.2}",
            label, summary.points, summary.matches_played, summary.avg_goals_for, summary.avg_goals_against
        );
    }

    if let Some(opponent) = opponent {
        let h2h = engineer.head_to_head(team, opponent, config.h2h_window).await?;
        println!("\n🤝 Head to head vs {}:", team_label(&pool, opponent).await?);
        println!(
            "   {} meetings: {} wins, {} draws, {} losses",
            h2h.meetings(),
            h2h.team_a_wins,
            h2h.draws,
            h2h.team_b_wins
        );
    }

    Ok(())
}

/// Load the saved model when one is available, otherwise train from the store.
async fn ready_predictor(
    pool: &SqlitePool,
    config: &PredictorConfig,
    model: Option<&Path>,
) -> Result<HybridPredictor<SqliteMatchStore>> {
    let mut predictor = HybridPredictor::new(SqliteMatchStore::new(pool.clone()), config.clone());

    match model.map(Path::to_path_buf).or_else(|| config.model_path.clone()) {
        Some(path) if path.exists() => {
            predictor.load_state(&path)?;
            println!("📂 Loaded model from {}", path.display());
        }
        Some(path) => {
            println!("⚠️  No model at {}, training a fresh one...", path.display());
            predictor.train().await?;
        }
        None => {
            println!("🧠 No saved model configured, training a fresh one...");
            predictor.train().await?;
        }
    }

    Ok(predictor)
}

async fn team_label(pool: &SqlitePool, team_id: TeamId) -> Result<String> {
    Ok(get_team_name(pool, team_id)
        .await?
        .unwrap_or_else(|| format!("Team #{}", team_id)))
}

fn print_prediction(prediction: &PredictionResult) {
    println!(
        "   Home win: {:.1}% ({:.2}) | Draw: {:.1}% ({:.2}) | Away win: {:.1}% ({:.2})",
        prediction.home_win_prob * 100.0,
        probability_to_odds(prediction.home_win_prob),
        prediction.draw_prob * 100.0,
        probability_to_odds(prediction.draw_prob),
        prediction.away_win_prob * 100.0,
        probability_to_odds(prediction.away_win_prob)
    );
    let (home_goals, away_goals) =
        PoissonModel::new().most_likely_score(prediction.expected_home_goals, prediction.expected_away_goals);
    println!(
        "   Expected goals: {:.2} - {:.2} | Likeliest score: {}-{} | Most likely: {}",
        prediction.expected_home_goals,
        prediction.expected_away_goals,
        home_goals,
        away_goals,
        prediction.most_likely()
    );
    println!("   Confidence: {:.1}%", prediction.confidence * 100.0);
}
