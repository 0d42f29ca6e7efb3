use envconfig::Envconfig;
use lazy_static::lazy_static;

#[derive(Debug, Envconfig)]
pub struct Config {
    #[envconfig(from = "DOCMETA_LOG_LEVEL", default = "info")]
    pub log_level: String,
    //Documents per forward store block
    #[envconfig(from = "DOCMETA_BLOCK_ROWS", default = "4096")]
    pub block_rows: usize,
    //Upper bound on worker threads used to build reverse maps
    #[envconfig(from = "DOCMETA_REVERSE_BUILD_THREADS", default = "4")]
    pub reverse_build_threads: usize,
    #[envconfig(from = "DOCMETA_INDEX_PREFIX", default = "data")]
    pub index_prefix: String,
}

impl Config {
    pub fn init() -> Config {
        Config::init_from_env().expect("Failed to load config")
    }
}

lazy_static! {
    pub static ref CONFIG: Config = Config::init();
}
