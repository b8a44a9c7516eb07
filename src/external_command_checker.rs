use bird_tool_utils::external_command_checker::*;

pub fn check_for_dependencies() {
    check_for_vsearch();
}

pub fn check_for_vsearch() {
    self::check_for_external_command_presence("vsearch", "which vsearch");
    self::default_version_check("vsearch", "2.7.0", false, None);
}
