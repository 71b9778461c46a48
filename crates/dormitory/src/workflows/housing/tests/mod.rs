mod common;
mod registration;
mod transfer;
