// command line interface

use crate::output::Output;
use crate::{AskOptions, Config, Db, LexicalGuard, Server, ask, client_for, sanitize};
use clap::{Parser, Subcommand};
use miette::Result;
use std::num::NonZeroU32;

#[derive(Parser)]
#[command(name = "sqlgate", about = "Ask your database questions in plain language")]
struct Cli {
    /// database connection url
    #[arg(long, short, env = "DATABASE_URL", global = true)]
    db: Option<String>,

    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// start as http server
    Serve {
        /// port number
        #[arg(long, default_value = "3000")]
        port: u16,

        /// host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// answer one question and exit
    Ask {
        question: String,

        /// print json instead of a table
        #[arg(long)]
        raw: bool,
    },

    /// run sql through the guard without touching a database
    Check {
        sql: String,

        /// row cap, defaults to --result-limit
        #[arg(long)]
        max_rows: Option<NonZeroU32>,

        /// print json instead of text
        #[arg(long)]
        raw: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => {
            let db = require_db(cli.db)?;
            Ok(Server::run(cli.config, &db, &host, port).await?)
        }

        Commands::Ask { question, raw } => {
            let url = require_db(cli.db)?;
            let db = Db::connect_read_only(&url).await?;
            let schema = db.schema().await?;
            let generator = client_for(&cli.config.generator)?;

            let options = AskOptions {
                result_limit: cli.config.result_limit,
                summarize: cli.config.summarize,
            };
            let response = ask(
                generator.as_ref(),
                &LexicalGuard,
                &db,
                Some(&schema),
                &question,
                &options,
            )
            .await;

            if raw {
                Output::raw(&response);
            } else {
                Output::pretty(&response);
            }

            if !response.ok {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Check { sql, max_rows, raw } => {
            let verdict = sanitize(&sql, max_rows.unwrap_or(cli.config.result_limit));
            Output::verdict(&verdict, raw);

            if !verdict.is_accepted() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn require_db(db: Option<String>) -> Result<String> {
    db.ok_or_else(|| miette::miette!("database url required (--db or DATABASE_URL)"))
}
