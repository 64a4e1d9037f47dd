mod locals;
mod module;
