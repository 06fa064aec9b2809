/*!
A store-and-forward Bundle Protocol Agent (RFC 9171) for nodes with
intermittent connectivity.

The BPA ingests bundles from local applications ([`endpoint::Endpoint`]) and
from peers through Convergence Layer Adapters ([`cla::Cla`]), runs the
receive → dispatch → forward → deliver state machine, persists bundles that
cannot be forwarded yet ([`storage::Storage`]), and retransmits them across
contact opportunities using a pluggable routing policy ([`routing::Router`]).

# Getting started

```no_run
use tundra_bpa::config::Config;
use tundra_bpa::runtime::Runtime;

# async fn demo() -> Result<(), Box<dyn std::error::Error>> {
let runtime = Runtime::start("dtn:node1", Config::default())?;

// hand the node's receive handle to a pushing CLA, then
// runtime.add_cla(...) registers the transport with the router

let app = runtime.local_endpoint();
app.send(b"hello", "dtn:node2", false, None).await?;

runtime.shutdown().await;
# Ok(())
# }
```
*/

pub mod bpa;
pub mod bundle_info;
pub mod cla;
pub mod config;
pub mod endpoint;
pub mod hash;
pub mod node;
pub mod reason;
pub mod routing;
pub mod runtime;
pub mod storage;
pub mod task_pool;

mod error;
pub use error::{SendError, SetupError};
