pub mod fixtures;

#[cfg(test)]
mod archive_tests;
#[cfg(test)]
mod health_tests;
#[cfg(test)]
mod hotword_tests;
#[cfg(test)]
mod llm_retry_tests;
#[cfg(test)]
mod process_tests;
#[cfg(test)]
mod voice_tests;
