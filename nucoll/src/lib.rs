pub mod handlers;

pub use handlers::{
    FetchDecision, FetchSummary, GlobalArgs, InitOptions, fetch_decision, format_resolution,
    post_source, run_edgelist, run_fetch, run_init, run_resolve, run_tweets,
};
