use std::io::Write as _;

use anyhow::{bail, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use support_rag::{
    api,
    app_state::AppState,
    config::{AppConfig, StoreKind},
    pipeline::Pipeline,
    rag::EvaluationReport,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Asistente RAG da Central de Ajuda.
#[derive(Parser)]
#[command(name = "support-rag", version, about)]
struct Cli {
    /// Máximo de páginas a visitar no crawl
    #[arg(long, global = true)]
    max_articles: Option<usize>,

    /// Refaz o scraping mesmo que exista o arquivo de artigos
    #[arg(long, global = true)]
    force_rescrape: bool,

    /// Recria o índice vetorial mesmo que exista um salvo
    #[arg(long, global = true)]
    force_recreate_index: bool,

    /// Backend do índice vetorial
    #[arg(long, value_enum, global = true)]
    store_type: Option<StoreKind>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Executa scraping, chunking e indexação
    Setup,
    /// Faz uma única pergunta
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
    /// Executa a bateria de avaliação
    Evaluate,
    /// Modo interativo no terminal
    Interactive,
    /// Mostra a configuração e o estado do índice
    Info,
    /// Sobe o servidor HTTP
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 2. Cargar configuración (los flags de la CLI mandan sobre el entorno)
    let mut cfg = AppConfig::from_env()?;
    if let Some(kind) = cli.store_type {
        cfg.store_kind = kind;
    }

    let flags = cli_flags(&cli);
    let mut pipeline = Pipeline::from_config(cfg.clone())?;

    match cli.command.unwrap_or(Command::Info) {
        Command::Setup => {
            ensure_setup(&mut pipeline, &flags).await?;
            println!("✅ Pipeline configurado com sucesso.");
        }
        Command::Ask { question } => {
            ensure_setup(&mut pipeline, &flags).await?;
            let question = question.join(" ");
            let answer = pipeline.ask(&question).await?;
            println!("\nPergunta: {question}");
            println!("{}", "-".repeat(50));
            println!("{}", answer.formatted_answer);
        }
        Command::Evaluate => {
            ensure_setup(&mut pipeline, &flags).await?;
            println!("\nExecutando avaliação do sistema...");
            let report = pipeline.run_evaluation().await?;
            print_report(&report);
        }
        Command::Interactive => {
            ensure_setup(&mut pipeline, &flags).await?;
            interactive(&pipeline, &cfg.support_brand).await?;
        }
        Command::Info => {
            let info = pipeline.get_info().await;
            println!("\n{}", "=".repeat(60));
            println!("🔧 INFORMAÇÕES DO PIPELINE");
            println!("{}", "=".repeat(60));
            println!("{}", serde_json::to_string_pretty(&info)?);
            println!("\n💡 Uso: support-rag <setup | ask PERGUNTA | evaluate | interactive | serve>");
        }
        Command::Serve => serve(cfg, pipeline, &flags).await?,
    }

    Ok(())
}

struct SetupFlags {
    max_articles: Option<usize>,
    force_rescrape: bool,
    force_recreate_index: bool,
}

fn cli_flags(cli: &Cli) -> SetupFlags {
    SetupFlags {
        max_articles: cli.max_articles,
        force_rescrape: cli.force_rescrape,
        force_recreate_index: cli.force_recreate_index,
    }
}

async fn ensure_setup(pipeline: &mut Pipeline, flags: &SetupFlags) -> Result<()> {
    let ok = pipeline
        .setup(
            flags.max_articles,
            flags.force_rescrape,
            flags.force_recreate_index,
        )
        .await;
    if !ok {
        bail!("No se pudo inicializar el pipeline; revisa los logs");
    }
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    let m = &report.metrics;
    println!("\n{}", "=".repeat(60));
    println!("📊 RESULTADOS DA AVALIAÇÃO");
    println!("{}", "=".repeat(60));
    println!("Total de perguntas: {}", m.total_questions);
    println!("Média de fontes por pergunta: {:.2}", m.avg_sources_per_question);
    println!("Cobertura média de fontes: {:.2}", m.avg_source_coverage);
    println!("Taxa de erro: {:.2}%", m.error_rate * 100.0);

    println!("\n📝 Detalhes por pergunta:");
    for r in &report.results {
        println!("\n❓ {}", r.question);
        println!("   Fontes encontradas: {}", r.sources_found);
        if r.has_error {
            println!("   ❌ Erro na resposta");
        }
    }
}

async fn interactive(pipeline: &Pipeline, brand: &str) -> Result<()> {
    println!("\n{}", "=".repeat(60));
    println!("🤖 Assistente RAG {brand}");
    println!("Digite suas perguntas (ou 'sair' para sair)");
    println!("{}", "=".repeat(60));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n❓ Sua pergunta: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "sair" | "q") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        println!("\n🔍 Buscando informações...");
        match pipeline.ask(question).await {
            Ok(answer) => {
                println!("\n{}", "-".repeat(50));
                println!("📝 Resposta:");
                println!("{}", answer.formatted_answer);
                if let Some(err) = answer.error {
                    println!("\n⚠️  Erro: {err}");
                }
            }
            Err(e) => println!("\n❌ Erro: {e}"),
        }
    }

    println!("👋 Até logo!");
    Ok(())
}

async fn serve(cfg: AppConfig, mut pipeline: Pipeline, flags: &SetupFlags) -> Result<()> {
    // El servidor arranca aunque el setup falle; se puede relanzar con POST /api/setup.
    let message = if pipeline
        .setup(
            flags.max_articles,
            flags.force_rescrape,
            flags.force_recreate_index,
        )
        .await
    {
        "Servidor listo."
    } else {
        warn!("Pipeline sin inicializar; usa POST /api/setup");
        "Pipeline sin inicializar."
    };

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let app_state = AppState::new(cfg.clone(), pipeline, shutdown_tx, message);

    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(&cfg.server_addr).await?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    app_state.pipeline.write().await.shutdown().await;
    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
