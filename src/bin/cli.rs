#![cfg(not(tarpaulin_include))]

use bigpicture::catalog::{self, Catalog};
use bigpicture::config::Config;
use bigpicture::engagement;
use bigpicture::search;
use bigpicture::subscribers::SubscriberList;
use chrono::Local;
use std::env;

const USAGE: &str = "Usage: ideas <command>

Commands:
  today              Show today's featured idea
  search <words...>  Rank ideas against a problem description
  stats <id>         Show views, likes and shares of an idea
  like <id>          Add a like to an idea
  subscribers        List subscribed email addresses";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    let catalog = Catalog::new(&config.data_dir);

    match (command.as_str(), args.get(1)) {
        ("today", _) => {
            let ideas = catalog.load_ideas()?;
            match catalog::todays_idea(&ideas, Local::now().date_naive()) {
                Some(idea) => println!("{}: {}", idea.id, idea.title),
                None => println!("No ideas yet"),
            }
        }
        ("search", Some(_)) => {
            let problem = args[1..].join(" ");
            let ideas = catalog.load_ideas()?;
            for scored in search::match_problem(&ideas, &problem) {
                println!("{:>3}  {}  {}", scored.score, scored.idea.id, scored.idea.title);
            }
        }
        ("stats", Some(id)) | ("like", Some(id)) => {
            if catalog.get_idea_by_id(id)?.is_none() {
                eprintln!("Idea not found: {}", id);
                return Ok(());
            }
            let counters =
                engagement::open_store(config.counter_backend, &catalog.ideas_path(), &config.counter_db)?;
            if command == "like" {
                counters.record_like(id)?;
            }
            let counts = counters.counts(id)?;
            println!(
                "{}: {} views, {} likes, {} shares",
                id, counts.views, counts.likes, counts.shares
            );
        }
        ("subscribers", _) => {
            for email in SubscriberList::new(&config.data_dir).emails()? {
                println!("{}", email);
            }
        }
        _ => eprintln!("{}", USAGE),
    }

    Ok(())
}
