tonic::include_proto!("vdb.replication");
