mod cache_properties;
mod oracle_contract;
mod pipeline;
