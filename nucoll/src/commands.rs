use crate::CLAP_STYLING;
use clap::{arg, command};
use nucoll::handlers::DEFAULT_MAX_FRIENDS;
use nucoll_client::transport::DEFAULT_API_URL;
use nucoll_core::config::DEFAULT_CONFIG_PATH;
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("nucoll")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("nucoll")
        .about("Collect social graph data and export it as GML")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Only log warnings and errors").required(false))
        .arg(
            arg!(--"config" <PATH>)
                .required(false)
                .global(true)
                .help("Credentials file")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            arg!(--"api-url" <URL>)
                .required(false)
                .global(true)
                .help("Base URL of the API")
                .value_parser(clap::value_parser!(Url))
                .default_value(DEFAULT_API_URL),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("init")
                .about("Retrieve friends, followers, list members or mentioned handles of a handle")
                .arg(arg!(<HANDLE>).help("Handle the collection is centered on"))
                .arg(
                    arg!(-o --"followers")
                        .required(false)
                        .help("Collect followers instead of friends"),
                )
                .arg(
                    arg!(-q --"query")
                        .required(false)
                        .help("Collect handles mentioned in <HANDLE>.qry")
                        .conflicts_with_all(["list", "retweeters"]),
                )
                .arg(
                    arg!(-n --"first-mention")
                        .required(false)
                        .help("Only the first mention on each line of the query file")
                        .requires("query"),
                )
                .arg(
                    arg!(-m --"list" <LIST>)
                        .required(false)
                        .help("Collect members of a list owned by <HANDLE>")
                        .conflicts_with("retweeters"),
                )
                .arg(
                    arg!(-r --"retweeters" <MAX_POSTS>)
                        .required(false)
                        .help("Collect followers who replied to <HANDLE> within their last MAX_POSTS posts")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(-i --"images")
                        .required(false)
                        .help("Download avatars to img/"),
                ),
        )
        .subcommand(
            command!("fetch")
                .about("Retrieve the friends of every node collected for a handle")
                .arg(arg!(<HANDLE>).help("Handle whose .dat file is read"))
                .arg(
                    arg!(-c --"count" <MAX_FRIENDS>)
                        .required(false)
                        .help(format!(
                            "Skip nodes with more friends than this [default: {}]",
                            DEFAULT_MAX_FRIENDS
                        ))
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-f --"force")
                        .required(false)
                        .help("Fetch again even when a friends file exists"),
                ),
        )
        .subcommand(
            command!("edgelist")
                .about("Generate a graph in GML format")
                .arg(arg!(<HANDLE> ...).help("Handles whose .dat files are combined"))
                .arg(
                    arg!(-e --"ego")
                        .required(false)
                        .help("Add each handle as a node linked to its collected nodes"),
                )
                .arg(
                    arg!(-m --"missing")
                        .required(false)
                        .help("Include nodes whose friends were never fetched"),
                ),
        )
        .subcommand(
            command!("tweets")
                .about("Retrieve posts of a handle, a search query, a list or replies to a post")
                .arg(arg!(<ARG>).help("Handle, or search query with --query"))
                .arg(
                    arg!(-q --"query")
                        .required(false)
                        .help("Treat <ARG> as a search query")
                        .conflicts_with_all(["list", "post"]),
                )
                .arg(
                    arg!(-m --"list" <LIST>)
                        .required(false)
                        .help("Posts of a list owned by <ARG>")
                        .conflicts_with("post"),
                )
                .arg(
                    arg!(-p --"post" <ID>)
                        .required(false)
                        .help("Replies to post ID addressed to <ARG>")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            command!("resolve")
                .about("Convert handles to IDs and back, with basic counts")
                .arg(arg!(<HANDLE> ...).help("Handles or numeric IDs")),
        )
}
