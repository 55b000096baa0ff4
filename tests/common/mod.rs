//! Deterministic in-process providers shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use insight_flow::embedding::Embedder;
use insight_flow::generation::{GenerationOptions, Generator};

pub const DIMS: usize = 512;

/// Bag-of-words embedder: every distinct lowercase word gets its own
/// dimension, so unrelated texts score exactly zero.
pub struct VocabEmbedder {
    model: String,
    vocab: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
    poison: Option<String>,
}

impl VocabEmbedder {
    pub fn new() -> Self {
        Self::named("vocab")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
            vocab: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            poison: None,
        }
    }

    /// Fails any batch containing `word`.
    pub fn poisoned(word: &str) -> Self {
        Self {
            poison: Some(word.to_string()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vocab = self.vocab.lock().unwrap();
        let mut v = vec![0.0; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let next = vocab.len();
            let slot = *vocab.entry(word.to_lowercase()).or_insert(next);
            v[slot % DIMS] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(poison) = &self.poison {
            if texts.iter().any(|t| t.contains(poison.as_str())) {
                bail!("embedding service rejected the batch");
            }
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Answers with the first line of the context and records every call.
pub struct EchoGenerator {
    prompts: Mutex<Vec<String>>,
    temperatures: Mutex<Vec<f32>>,
    delay: Option<Duration>,
}

impl EchoGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            temperatures: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn last_temperature(&self) -> Option<f32> {
        self.temperatures.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.temperatures.lock().unwrap().push(options.temperature);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let first_line = prompt
            .split("Context: ")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or_default();
        Ok(format!("  {}  ", first_line))
    }
}

pub fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub const FRUIT_CSV: &str = "fruit,color\napple,red\nbanana,yellow\ncherry,dark red\n";
pub const PLANET_CSV: &str = "planet,moons\nmars,2\njupiter,95\nsaturn,146\n";

/// Number of `.sqlite` generation files under a storage directory.
pub fn generation_files(storage: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(storage.join("generations"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| n.ends_with(".sqlite"))
        .collect();
    names.sort();
    names
}
