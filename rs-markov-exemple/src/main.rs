use std::sync::Arc;

use rs_markov_core::config::MarkovConfig;
use rs_markov_core::corpus::{CorpusStore, FsCorpusBackend};
use rs_markov_core::engine::{Outcome, ResponseEngine};
use rs_markov_core::ingest::IngestSession;
use rs_markov_core::settings::{MemorySettingsStore, SettingsStore};
use rs_markov_core::types::{BotIdentity, ChannelId, CommunityId, IncomingMessage, UserId};
use rs_markov_core::MarkovError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = MarkovConfig::default();
    let community = CommunityId::from("exemple");

    // Corpus files are kept in "./data/markov/corpus", settings only live in memory
    let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::new(config.max_corpus_bytes));
    let backend = Arc::new(FsCorpusBackend::new(config.data_dir.join("corpus")));
    let corpus = Arc::new(CorpusStore::new(backend, settings, config.state_size));

    // Replay every line of the ".txt" files in "./data" as message history.
    // Everything is committed at once: either all files fit or nothing is written.
    let mut session = IngestSession::new(Arc::clone(&corpus), community.clone());
    for entry in std::fs::read_dir("./data")? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            for line in std::fs::read_to_string(&path)?.lines() {
                session.push_message(line)?;
            }
        }
    }
    match session.commit().await {
        Ok(report) => println!("Loaded {} lines ({} bytes)", report.items, report.bytes),
        Err(MarkovError::EmptyCorpus) => println!("No text found in ./data, using the existing corpus"),
        Err(MarkovError::CorpusOverflow { size, max }) => {
            println!("The corpus would grow to {size} bytes, over the {max} byte allowance")
        }
        Err(e) => return Err(e.into()),
    }
    println!("{}", corpus.usage(&community)?.summary());

    let engine = ResponseEngine::new(corpus, config);
    let me = BotIdentity { user_id: UserId::from("bot"), display_name: "Markov".to_owned() };

    // Mention the bot ten times; the seed word is picked from what follows the mention
    for i in 0..10 {
        let message = IncomingMessage {
            community_id: community.clone(),
            channel_id: ChannelId::from("general"),
            author_id: UserId::from("you"),
            author_name: "You".to_owned(),
            content: "@Markov the".to_owned(),
        };
        match engine.handle(&message, &me).await? {
            Outcome::Replied(reply) => println!("Generated sentence {}: {}", i + 1, reply.text),
            other => println!("Unexpected outcome: {other:?}"),
        }
    }

    Ok(())
}
