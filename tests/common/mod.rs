pub mod mock_instance;
