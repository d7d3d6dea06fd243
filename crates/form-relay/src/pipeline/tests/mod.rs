mod common;
mod status;
mod validator;
