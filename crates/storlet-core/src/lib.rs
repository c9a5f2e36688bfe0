//! storlet-core
//!
//! Core building blocks for the storlet daemon: one process per storlet,
//! serving Execute/Ping/Cancel/Halt requests that arrive over the bus socket
//! together with the file descriptors the storlet reads and writes.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, command, fd_type, metadata, envelope, response, errors）
//! - **codec**: ワイヤフォーマット（frame レイアウト、params / metadata の JSON）
//! - **ports**: 抽象化レイヤー（Transport, Storlet, IdGenerator, Clock）
//! - **stream**: storlet に渡すストリーム（入力、出力オブジェクト、コンテナ、ロガー）
//! - **task**: コマンドごとの Task と TaskFactory、storlet 実行ユニット
//! - **app**: アプリケーションロジック（builder, config, dispatch_loop, execution, registry）
//! - **impls**: 実装（SBusTransport, ChannelTransport）

pub mod domain;
pub mod codec;
pub mod ports;
pub mod stream;
pub mod task;
pub mod app;
pub mod impls;
