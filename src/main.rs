extern crate currawong;

extern crate clap;
use clap::*;

extern crate log;

extern crate bird_tool_utils;
use bird_tool_utils::clap_utils::*;

use currawong::cluster_argument_parsing::*;

static PROGRAM_NAME: &str = "Currawong";

fn main() {
    let app = build_cli();
    let matches = app.clone().get_matches();
    set_log_level(&matches, false, PROGRAM_NAME, crate_version!());

    match matches.subcommand_name() {
        Some("cluster-de-novo") => {
            let m = matches.subcommand_matches("cluster-de-novo").unwrap();
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            run_cluster_de_novo_subcommand(m);
        }
        Some("cluster-closed-reference") => {
            let m = matches
                .subcommand_matches("cluster-closed-reference")
                .unwrap();
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            run_cluster_closed_reference_subcommand(m);
        }
        Some("cluster-open-reference") => {
            let m = matches.subcommand_matches("cluster-open-reference").unwrap();
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            run_cluster_open_reference_subcommand(m);
        }
        Some("dereplicate") => {
            let m = matches.subcommand_matches("dereplicate").unwrap();
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            run_dereplicate_subcommand(m);
        }
        Some("uchime-denovo") => {
            let m = matches.subcommand_matches("uchime-denovo").unwrap();
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            run_uchime_denovo_subcommand(m);
        }
        Some("uchime-ref") => {
            let m = matches.subcommand_matches("uchime-ref").unwrap();
            set_log_level(m, true, PROGRAM_NAME, crate_version!());
            run_uchime_ref_subcommand(m);
        }
        _ => panic!("Programming error"),
    }
}

fn build_cli() -> Command {
    let mut app = add_clap_verbosity_flags(Command::new("currawong"))
        .version(crate_version!())
        .author("Ben J. Woodcroft <benjwoodcroft near gmail.com>")
        .about("Amplicon feature table clusterer / dereplicator wrapping vsearch")
        .arg_required_else_help(true);

    app = add_cluster_de_novo_subcommand(app);
    app = add_cluster_closed_reference_subcommand(app);
    app = add_cluster_open_reference_subcommand(app);
    app = add_dereplicate_subcommand(app);
    app = add_uchime_denovo_subcommand(app);
    app = add_uchime_ref_subcommand(app);
    app
}
