//! Export sessions
//!
//! A session builds one generated image, exports it through a bridge and runs
//! a number of pull rounds against the bridge's callback table. Everything a
//! session touches lives on the thread that runs it.

use crate::config::SessionConfig;
use crate::consumer::ForeignConsumer;
use anyhow::{Context, Result};
use image_export_bridge::{
    ExportEvent, ExportSession, GeneratedImage, ImportedImage, TableImporter,
};
use std::cell::Cell;
use std::rc::Rc;

/// What happened in one round
#[derive(Debug)]
pub struct RoundReport {
    pub round: usize,
    /// The pipeline reported a change and data was pulled
    pub pulled: Option<ImportedImage>,
    /// Status returned by a foreign consumer, if one drove this round
    pub consumer_status: Option<i32>,
    /// Failure left on the bridge during this round
    pub error: Option<String>,
}

/// Outcome of a whole session
#[derive(Debug)]
pub struct SessionReport {
    pub name: String,
    pub handle: u64,
    pub rounds: Vec<RoundReport>,
    pub start_events: usize,
    pub end_events: usize,
}

impl SessionReport {
    pub fn pulled_rounds(&self) -> usize {
        self.rounds.iter().filter(|r| r.pulled.is_some()).count()
    }

    pub fn failed_rounds(&self) -> usize {
        self.rounds
            .iter()
            .filter(|r| r.error.is_some() || r.consumer_status.map_or(false, |s| s != 0))
            .count()
    }
}

/// Run every round of `config`, pulling with the built-in importer unless a
/// foreign consumer is given.
pub fn run_session(config: &SessionConfig, consumer: Option<&ForeignConsumer>) -> Result<SessionReport> {
    let image = GeneratedImage::new(config.source.clone())
        .with_context(|| format!("Failed to create source for session '{}'", config.name))?
        .into_shared();

    let session = ExportSession::for_input(&image);
    let starts = Rc::new(Cell::new(0usize));
    let ends = Rc::new(Cell::new(0usize));
    {
        let mut bridge = session.bridge_mut();
        let counter = Rc::clone(&starts);
        bridge.add_observer(ExportEvent::Start, move |_| counter.set(counter.get() + 1));
        let counter = Rc::clone(&ends);
        bridge.add_observer(ExportEvent::End, move |_| counter.set(counter.get() + 1));
    }

    log::info!(
        "Session '{}' exporting {} {} x{} through bridge {}",
        config.name,
        config.source.whole_extent,
        config.source.scalar_type,
        config.source.components,
        session.handle()
    );

    let mut rounds = Vec::with_capacity(config.rounds);
    for round in 0..config.rounds {
        if round > 0 && config.modify_between_rounds {
            image.borrow_mut().modified();
        }

        let report = match consumer {
            Some(consumer) => {
                let status = consumer.consume(session.table());
                if status != 0 {
                    log::warn!(
                        "Session '{}' round {}: consumer returned {}",
                        config.name,
                        round,
                        status
                    );
                }
                RoundReport {
                    round,
                    pulled: None,
                    consumer_status: Some(status),
                    error: None,
                }
            }
            None => import_round(config, &session, round),
        };

        let error = session.bridge_mut().take_last_error().map(|e| e.to_string());
        rounds.push(RoundReport {
            error: report.error.or(error),
            ..report
        });
        log::debug!("{}", *session.bridge());
    }

    Ok(SessionReport {
        name: config.name.clone(),
        handle: session.handle().value(),
        rounds,
        start_events: starts.get(),
        end_events: ends.get(),
    })
}

/// One round through the built-in importer: negotiate, check, request, pull
fn import_round(config: &SessionConfig, session: &ExportSession, round: usize) -> RoundReport {
    let importer = TableImporter::new(session.table());
    importer.update_information();
    if let Some(extent) = config.update_extent {
        importer.propagate_update_extent(extent);
    }

    match importer.pull_if_modified() {
        Ok(Some(image)) => {
            log::info!(
                "Session '{}' round {}: pulled {} bytes for {}",
                config.name,
                round,
                image.as_bytes().len(),
                image.data_extent
            );
            RoundReport {
                round,
                pulled: Some(image),
                consumer_status: None,
                error: None,
            }
        }
        Ok(None) => {
            log::info!("Session '{}' round {}: pipeline unchanged", config.name, round);
            RoundReport {
                round,
                pulled: None,
                consumer_status: None,
                error: None,
            }
        }
        Err(e) => {
            log::error!("Session '{}' round {}: {}", config.name, round, e);
            RoundReport {
                round,
                pulled: None,
                consumer_status: None,
                error: Some(e.to_string()),
            }
        }
    }
}
