use std::path::Path;

use driftbot_core::{Error, Paths, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

/// Built-in task list, grouped thematically. Used when no tasks file
/// overrides it.
pub const DEFAULT_TASKS: &[&str] = &[
    // Technical searches
    "Search for 'how to remove specific text from a file' and summarize the methods",
    "Look up 'C# SQL query with user input' and explain SQL injection prevention",
    "Search for 'python programming tutorials' and list beginner resources",
    "Find information about 'how to use vscode' and list keyboard shortcuts",
    // Everyday searches
    "Search for 'what is my ip address' and explain IP types",
    "Look up 'weather' and get current conditions",
    "Search for 'starbucks near me' (simulate location-based search)",
    "Find 'gmail' features and tips",
    "Search 'facebook' privacy settings guide",
    // Hobby content
    "Search for 'cake decorating tutorials' and summarize techniques",
    "Look up 'buttercream icing recipes' and list ingredients",
    "Find 'python 101' tutorial videos descriptions",
    "Search for 'VSCode tips and tricks' content",
    // News
    "Check CNN for breaking news headlines",
    "Look up BBC world news stories",
    "Search Reuters for financial news",
    "Find technology news from tech sites",
    "Look up 'nfl schedule' or 'nba scores'",
    "Search for 'netflix' new releases",
    // Education and research
    "Search MIT OpenCourseWare for free courses",
    "Look up Stanford research papers",
    "Find NASA space exploration updates",
    "Search NIST for technical publications",
    "Browse Wikipedia for random interesting articles",
    // Shopping
    "Search Amazon for trending electronics",
    "Look up eBay auction items",
    "Find Walmart deals and discounts",
    "Search for product reviews and comparisons",
    // Government and public services
    "Search CDC health guidelines",
    "Look up FBI safety tips",
    "Find IRS tax information",
    "Search government services and resources",
    // Vendors
    "Browse Microsoft product updates",
    "Search Apple new releases",
    "Look up Adobe Creative Cloud features",
    "Find IBM technology solutions",
    // Social media
    "Search Twitter/X trending topics",
    "Look up Instagram popular hashtags",
    "Find TikTok viral content descriptions",
    "Search LinkedIn professional tips",
    // Exploration
    "Visit and describe a random popular website",
    "Explore a random news website",
    "Browse a random educational resource",
    "Check a random technology blog",
];

/// The pool of tasks clusters are sampled from.
#[derive(Debug, Clone)]
pub struct TaskPool {
    tasks: Vec<String>,
}

impl TaskPool {
    pub fn new(tasks: Vec<String>) -> Self {
        Self { tasks }
    }

    /// Read one task per line. Blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let tasks: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        if tasks.is_empty() {
            return Err(Error::Task(format!(
                "Tasks file {} contains no tasks",
                path.display()
            )));
        }

        Ok(Self { tasks })
    }

    /// Use the tasks file under the workspace when present, otherwise the
    /// built-in list.
    pub fn load(paths: &Paths) -> Result<Self> {
        let tasks_file = paths.tasks_file();
        if tasks_file.exists() {
            let pool = Self::from_file(&tasks_file)?;
            info!(count = pool.len(), file = %tasks_file.display(), "Loaded tasks from file");
            Ok(pool)
        } else {
            Ok(Self::default())
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    /// Draw `min(k, len)` distinct tasks uniformly at random and return
    /// them in random order.
    pub fn sample(&self, k: usize, rng: &mut impl Rng) -> Vec<String> {
        let mut sampled: Vec<String> = self
            .tasks
            .choose_multiple(rng, k.min(self.tasks.len()))
            .cloned()
            .collect();
        sampled.shuffle(rng);
        sampled
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self {
            tasks: DEFAULT_TASKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
