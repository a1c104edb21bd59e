pub mod hook_installer;
pub mod pcm_provider;
