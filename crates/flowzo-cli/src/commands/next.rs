use clap::{Args, ValueEnum};
use flowzo_core::integrations::{GitHubClient, Integration, LinearClient, NextTask};
use flowzo_core::Config;

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    Github,
    Linear,
}

#[derive(Args)]
pub struct NextArgs {
    /// Only ask one tracker
    #[arg(long, value_enum)]
    source: Option<Source>,
    /// List up to integrations.issue_limit issues instead of one
    #[arg(long)]
    all: bool,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

impl NextArgs {
    fn wants(&self, source: Source) -> bool {
        self.source.map_or(true, |s| s == source)
    }

    fn limit(&self, config: &Config) -> u32 {
        if self.all {
            config.integrations.issue_limit
        } else {
            1
        }
    }
}

pub async fn run(args: NextArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let limit = args.limit(&config);
    let mut tasks: Vec<NextTask> = Vec::new();
    let mut asked = 0;

    if args.wants(Source::Github) {
        let github = GitHubClient::new();
        if github.is_authenticated() {
            asked += 1;
            match github.fetch_assigned_issues(limit).await {
                Ok(issues) => tasks.extend(issues.iter().map(|i| i.to_next_task())),
                Err(e) => tracing::warn!(error = %e, "github lookup failed"),
            }
        }
    }

    if args.wants(Source::Linear) {
        let linear = LinearClient::new();
        if linear.is_authenticated() {
            asked += 1;
            match linear.fetch_assigned_issues(limit).await {
                Ok(issues) => tasks.extend(issues.iter().map(|i| i.to_next_task())),
                Err(e) => tracing::warn!(error = %e, "linear lookup failed"),
            }
        }
    }

    if asked == 0 {
        return Err("no tracker connected. Run 'flowzo auth github login --token <TOKEN>' \
                    or 'flowzo auth linear login --token <KEY>' first"
            .into());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else if tasks.is_empty() {
        println!("Nothing assigned. Enjoy the quiet.");
    } else {
        for task in &tasks {
            println!("[{}] {}  {}", task.source, task.key, task.title);
            println!("    {}", task.url);
        }
    }
    Ok(())
}
